//! Line-editing front end: the input line and its key handling.

pub mod editor;
pub mod line;

pub use editor::{EditorAction, InputEditor};
pub use line::InputLine;
