pub mod environment;
pub mod value;
pub mod ops;

pub mod prelude {
    pub use super::{
        environment::*,
        value::*,
        ops::*
    };
}

#[cfg(test)]
mod tests;
