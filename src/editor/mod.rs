//! Interactive editing context

pub mod session;

pub use session::EditorSession;
