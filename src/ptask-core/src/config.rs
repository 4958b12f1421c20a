//! Compile-time tunables.
//!
//! These size the fixed-capacity arrays in [`crate::registry`] and
//! [`crate::listeners`], so they are `const` rather than a runtime-loaded
//! configuration object — changing them changes the memory layout.

/// Upper bound on the number of tasks live at once.
pub const MAX_TASKS: usize = 256;

/// Upper bound on the number of tasks listening on any single target.
pub const MAX_LISTENERS: usize = 20;

/// Maximum length, in bytes, of a task name (`≤ 30` chars, no `/`).
pub const MAX_NAME_LEN: usize = 30;

/// Most privileged value a user task may request. The user priority range
/// is `[101, 255]`, lower is more privileged.
pub const MAX_USER_PRIORITY: u16 = 101;

/// Least privileged value a user task may request.
pub const MIN_USER_PRIORITY: u16 = 255;

/// Argument-array bound for `task_create_multi`.
pub const MAX_CREATE_ARGS: usize = 10;
