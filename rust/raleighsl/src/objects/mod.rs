// raleighsl: object type plugins

pub mod counter;

pub use counter::{CounterObject, COUNTER_OBJECT_UUID};
