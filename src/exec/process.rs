// src/exec/process.rs

//! Process-tree bookkeeping: discovering descendants, liveness checks and
//! killing a probe's whole tree.
//!
//! Probes are spawned as leaders of their own process group, so on Unix a
//! single `killpg` reaches every descendant that did not move itself into
//! another group or session. Descendants found by walking parent pids are
//! signalled individually as a second net. A process that re-parents itself
//! away from the tree before the kill can still escape.

use tracing::{debug, trace};

/// Ids of the live descendants of `root` (children, grandchildren, ...).
///
/// Only implemented on Linux (via `/proc`); other platforms return an empty
/// list and rely on the process group alone.
pub fn descendants_of(root: u32) -> Vec<u32> {
    #[cfg(target_os = "linux")]
    {
        linux::descendants_of(root)
    }

    #[cfg(not(target_os = "linux"))]
    {
        let _ = root;
        Vec::new()
    }
}

/// Whether `pid` names a running (non-zombie) process.
pub fn is_alive(pid: u32) -> bool {
    #[cfg(target_os = "linux")]
    {
        linux::is_alive(pid)
    }

    #[cfg(all(unix, not(target_os = "linux")))]
    {
        // Signal 0 performs the permission/existence check only.
        unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
    }

    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

/// Force-kill a process tree.
///
/// - `group`: process group led by the spawned child, signalled as a whole.
/// - `pids`: individually recorded ids (the child and any descendants seen
///   at spawn time). Their current descendants are looked up again so
///   processes forked since spawn are included.
pub fn kill_tree(group: Option<u32>, pids: &[u32]) {
    let mut targets: Vec<u32> = Vec::new();
    for &pid in pids {
        targets.push(pid);
        targets.extend(descendants_of(pid));
    }
    targets.sort_unstable();
    targets.dedup();

    #[cfg(unix)]
    {
        if let Some(pgid) = group {
            // Negative pid addresses the whole process group.
            let rc = unsafe { libc::kill(-(pgid as libc::pid_t), libc::SIGKILL) };
            trace!(pgid, rc, "sent SIGKILL to process group");
        }

        for pid in targets {
            if is_alive(pid) {
                let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGKILL) };
                debug!(pid, rc, "sent SIGKILL to process");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = group;
        for pid in targets {
            let status = std::process::Command::new("taskkill")
                .args(["/F", "/T", "/PID", &pid.to_string()])
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null())
                .status();
            debug!(pid, ?status, "taskkill issued");
        }
    }
}

#[cfg(target_os = "linux")]
mod linux {
    use std::collections::HashMap;
    use std::fs;

    /// `(state, ppid)` from `/proc/<pid>/stat`.
    fn stat(pid: u32) -> Option<(char, u32)> {
        let raw = fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        // The command name is parenthesised and may contain spaces; fields
        // after the last ')' are whitespace separated.
        let after = &raw[raw.rfind(')')? + 1..];
        let mut fields = after.split_whitespace();
        let state = fields.next()?.chars().next()?;
        let ppid = fields.next()?.parse().ok()?;
        Some((state, ppid))
    }

    pub(super) fn is_alive(pid: u32) -> bool {
        matches!(stat(pid), Some((state, _)) if state != 'Z' && state != 'X')
    }

    pub(super) fn descendants_of(root: u32) -> Vec<u32> {
        let Ok(entries) = fs::read_dir("/proc") else {
            return Vec::new();
        };

        let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
        for entry in entries.flatten() {
            let Some(pid) = entry.file_name().to_str().and_then(|s| s.parse::<u32>().ok()) else {
                continue;
            };
            if let Some((state, ppid)) = stat(pid) {
                if state != 'Z' && state != 'X' {
                    children.entry(ppid).or_default().push(pid);
                }
            }
        }

        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(pid) = stack.pop() {
            if let Some(kids) = children.get(&pid) {
                for &kid in kids {
                    if kid != root && !out.contains(&kid) {
                        out.push(kid);
                        stack.push(kid);
                    }
                }
            }
        }
        out
    }
}
