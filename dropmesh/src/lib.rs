pub use dropmesh_core::model::{PeerId, RoomId, RoomState};

pub mod model {
    pub use dropmesh_core::model::*;
}

pub mod frame {
    pub use dropmesh_core::frame::*;
}

#[cfg(feature = "server")]
pub mod server {
    pub use dropmesh_server::*;
}

#[cfg(feature = "client")]
pub mod client {
    pub use dropmesh_client::*;
}
