pub mod acceptance;
pub mod names;
pub mod state_file;

pub use acceptance::{
    create_and_update_case, default_address, pre_check, AcceptanceError, AcceptanceResult, Check,
    CheckError, DestroyCheck, LiveFixture, StepOutcome, TestCase, TestStep,
};
pub use names::generate_resource_name;
pub use state_file::{StateFileError, StateFileResult};
