//! Client side of the document chat page: the interaction controller, the
//! page surface it drives, and the HTTP transport it talks through.

pub mod chat;
pub mod controller;
pub mod error;
pub mod surface;
pub mod transport;

pub use controller::{
    ControllerHandle, InteractionController, UiEvent, QUERY_FAILED_MESSAGE, UPLOAD_FAILED_MESSAGE,
};
pub use error::TransportError;
pub use surface::{MemorySurface, SurfaceState, UiSurface};
pub use transport::{DocumentApi, HttpDocumentApi, UploadForm};

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
