//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                          |
//! |------------|-------------------------------------------|
//! | `project`  | `Init`, `Status`, `Migrate`, `Detect`     |
//! | `health`   | `Check`, `Next`                           |
//! | `state`    | `Get`, `Set`, `Step`                      |
//! | `phase`    | `Phase`, `Roadmap`, `Tasks`               |
//! | `config`   | `Config`                                  |

pub mod config;
pub mod health;
pub mod phase;
pub mod project;
pub mod state;

pub use config::cmd_config;
pub use health::{cmd_check, cmd_next};
pub use phase::{cmd_phase, cmd_roadmap, cmd_tasks};
pub use project::{cmd_detect, cmd_init, cmd_migrate, cmd_status};
pub use state::{cmd_get, cmd_set, cmd_step};
