mod checkpoint;
mod run;
mod status;

pub use checkpoint::cmd_checkpoint;
pub use run::cmd_run;
pub use status::cmd_status;
