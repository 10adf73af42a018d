// Copyright 2025 The Skiff Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Process inspection utilities.

/// Get the current process ID.
pub fn get_pid() -> u32 {
    std::process::id()
}

/// Check whether this process has been reparented to init (PID 1).
///
/// On POSIX, a worker is spawned as a child of its local raylet; being
/// reparented to init means the raylet died. On platforms without POSIX
/// parentage semantics this always returns false.
pub fn parent_is_init() -> bool {
    #[cfg(unix)]
    {
        nix::unistd::getppid().as_raw() == 1
    }
    #[cfg(not(unix))]
    {
        false
    }
}

/// Check if a process with the given PID is alive.
pub fn is_process_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        use nix::sys::signal;
        use nix::unistd::Pid;
        signal::kill(Pid::from_raw(pid as i32), None).is_ok()
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_alive() {
        assert!(is_process_alive(get_pid()));
    }

    #[test]
    fn test_parent_not_init_under_test_runner() {
        // The test harness is our parent, not init.
        assert!(!parent_is_init());
    }
}
