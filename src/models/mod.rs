pub mod intent;
pub mod outcome;
