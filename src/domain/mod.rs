//! Domain layer: managed records, value objects and change events
pub mod entities;
pub mod events;
pub mod value_objects;
