pub mod edge;
pub mod vertex;

pub use edge::{Edge, EdgeEntry};
pub use vertex::Vertex;
