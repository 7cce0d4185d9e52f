//! Operating system health checks

use sysinfo::Disks;

use crate::health::{Ctx, SystemCheck, spot_ok, spot_skipped, spot_warn};

/// Free space below this many bytes on any mounted disk is a warning
pub const MIN_FREE_BYTES: u64 = 1 << 30;

/// Free space below this share of a disk is a warning
pub const MIN_FREE_RATIO: f64 = 0.10;

/// Checks the user the server would run as and the state of local disks
pub struct OperatingSystemCheck;

impl OperatingSystemCheck {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OperatingSystemCheck {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCheck for OperatingSystemCheck {
    fn name(&self) -> &'static str {
        "operating-system"
    }

    fn check(&self, ctx: &Ctx) -> anyhow::Result<()> {
        check_user(ctx, &whoami::username());
        check_disks(ctx);
        Ok(())
    }
}

fn check_user(ctx: &Ctx, user: &str) {
    if user == "root" {
        spot_warn(
            ctx,
            "is-root",
            "running as root is not recommended; use a dedicated unprivileged user",
        );
    } else {
        spot_ok(ctx, "is-root", format!("running as {user}"));
    }
}

fn check_disks(ctx: &Ctx) {
    let disks = Disks::new_with_refreshed_list();
    let usable: Vec<_> = disks.list().iter().filter(|d| d.total_space() > 0).collect();
    if usable.is_empty() {
        spot_skipped(ctx, "check-disk-usage", "no disks could be inspected");
        return;
    }

    for disk in usable {
        let name = format!("check-disk-usage-{}", disk.mount_point().display());
        match disk_usage_warning(disk.available_space(), disk.total_space()) {
            Some(warning) => spot_warn(ctx, &name, warning),
            None => spot_ok(ctx, &name, ""),
        }
    }
}

fn disk_usage_warning(available: u64, total: u64) -> Option<String> {
    let ratio = available as f64 / total as f64;
    if available < MIN_FREE_BYTES || ratio < MIN_FREE_RATIO {
        Some(format!(
            "only {:.1} MiB ({:.1}%) free",
            available as f64 / (1024.0 * 1024.0),
            ratio * 100.0
        ))
    } else {
        None
    }
}
