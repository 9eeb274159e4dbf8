use ic_canister_log::{declare_log_buffer, export};

// High-priority messages: committed state transitions.
declare_log_buffer!(name = INFO, capacity = 1000);

// Low-priority info messages: rejected calls and arithmetic detail.
declare_log_buffer!(name = DEBUG, capacity = 1000);

/// Messages currently held in the `INFO` buffer, oldest first.
pub fn export_info() -> Vec<String> {
    export(&INFO).into_iter().map(|entry| entry.message).collect()
}
