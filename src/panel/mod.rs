//! Role-scoped action panels: which one is active, what the player has
//! selected, and the single confirmed intent each grant is worth.

pub mod machine;


pub use machine::{ActionPanel, PanelMachine, Selection};
