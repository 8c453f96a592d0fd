use thiserror::Error;

use crate::patch::PatchCodecError;
use crate::render::RenderError;
use crate::router::RouterError;
use crate::session::SessionError;
use crate::session::runtime::TransportError;
use crate::socket::SocketError;
use crate::view::ViewError;
use crate::wire::WireError;

/// Crate-level convenience error.
///
/// Not a "god error": it is a thin wrapper over canonical subsystem errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Patch(#[from] PatchCodecError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Socket(#[from] SocketError),

    #[error(transparent)]
    View(#[from] ViewError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Wire(#[from] WireError),
}
