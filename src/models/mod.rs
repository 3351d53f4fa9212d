pub mod allergen_test;
pub mod allergy_template;
pub mod authorization;
pub mod enums;
pub mod filters;
pub mod patient;
pub mod physician;
pub mod service_type;
pub mod user;
pub mod vial;

pub use allergen_test::*;
pub use allergy_template::*;
pub use authorization::*;
pub use filters::*;
pub use patient::*;
pub use physician::*;
pub use service_type::*;
pub use user::*;
pub use vial::*;
