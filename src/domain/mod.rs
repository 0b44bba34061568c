pub mod calendar;
pub mod forecast;
pub mod observation;

pub use calendar::*;
pub use forecast::*;
pub use observation::*;
