/// System info built-ins
/// meminfo, ps, kill, diag

use crate::error::{CommandError, CommandResult};
use crate::services::sysinfo::{self, megabytes};
use crate::services::SessionMultiplexer;
use std::fmt::Write as _;

pub fn meminfo(mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    let mem = sysinfo::memory()?;
    let mut text = String::from("Memory usage:\n");
    let _ = writeln!(text, "  Total: {} bytes ({} MB)", mem.total, megabytes(mem.total));
    let _ = writeln!(
        text,
        "  Used:  {} bytes ({} MB, {:.1}%)",
        mem.used(),
        megabytes(mem.used()),
        mem.percent()
    );
    let _ = writeln!(
        text,
        "  Free:  {} bytes ({} MB, {:.1}%)",
        mem.available,
        megabytes(mem.available),
        100.0 - mem.percent()
    );
    text.push_str("\nSwap Memory:\n");
    let _ = writeln!(
        text,
        "  Total: {} bytes ({} MB)",
        mem.swap_total,
        megabytes(mem.swap_total)
    );
    let _ = writeln!(
        text,
        "  Used:  {} bytes ({} MB, {:.1}%)",
        mem.swap_used(),
        megabytes(mem.swap_used()),
        mem.swap_percent()
    );
    mux.write(&text);
    Ok(())
}

pub fn ps(mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    let processes = sysinfo::processes()?;
    let mut text = String::from("PID\tCPU%\tMEM%\tNAME\n");
    for p in processes {
        let _ = writeln!(
            text,
            "{}\t{:.1}\t{:.1}\t{}",
            p.pid, p.cpu_percent, p.mem_percent, p.name
        );
    }
    mux.write(&text);
    Ok(())
}

/// Only shells started by this panel and their descendants may be signalled,
/// unless the configuration allows any PID.
pub fn kill(mux: &mut SessionMultiplexer, args: &[String]) -> CommandResult {
    let Some(arg) = args.first() else {
        mux.write("Usage: kill <pid>\n");
        return Ok(());
    };
    let pid: i32 = arg.parse().map_err(|_| CommandError::InvalidPid)?;
    if pid <= 0 {
        mux.write("Invalid PID\n");
        return Ok(());
    }
    if !mux.config().allow_foreign_kill && !mux.owns_process(pid) {
        log::warn!("Refused to signal foreign PID {}", pid);
        return Err(CommandError::NotPermitted(pid));
    }
    sysinfo::terminate_process(pid)?;
    log::info!("Sent SIGTERM to {}", pid);
    mux.write(&format!("Process {} terminated\n", pid));
    Ok(())
}

pub fn diag(mux: &mut SessionMultiplexer, _args: &[String]) -> CommandResult {
    let mut text = String::from("Running system diagnostics...\n");

    let os = sysinfo::os_identity();
    text.push_str("\n=== System Information ===\n");
    let _ = writeln!(text, "System: {} {}", os.sysname, os.release);
    let _ = writeln!(text, "Version: {}", os.version);
    let _ = writeln!(text, "Machine: {}", os.machine);

    // each section reports its own failure and the report continues
    text.push_str("\n=== Memory Information ===\n");
    match sysinfo::memory() {
        Ok(mem) => {
            let _ = writeln!(
                text,
                "Memory: {} MB total, {} MB used, {} MB free",
                megabytes(mem.total),
                megabytes(mem.used()),
                megabytes(mem.available)
            );
        }
        Err(e) => {
            let _ = writeln!(text, "Error retrieving memory info: {}", e);
        }
    }

    text.push_str("\n=== Disk Information ===\n");
    match sysinfo::disks() {
        Ok(disks) => {
            for disk in disks {
                let _ = writeln!(
                    text,
                    "Partition: {} mounted at {}",
                    disk.device, disk.mountpoint
                );
                let _ = writeln!(text, "  Type: {}", disk.fstype);
                let _ = writeln!(text, "  Total: {} MB", megabytes(disk.total));
                let _ = writeln!(
                    text,
                    "  Used: {} MB ({:.1}%)",
                    megabytes(disk.used),
                    disk.percent()
                );
                let _ = writeln!(text, "  Free: {} MB", megabytes(disk.free));
            }
        }
        Err(e) => {
            let _ = writeln!(text, "Error retrieving disk info: {}", e);
        }
    }

    text.push_str("\n=== Network Information ===\n");
    match sysinfo::network() {
        Ok(counters) => {
            for nic in counters {
                let _ = writeln!(text, "Interface: {}", nic.interface);
                let _ = writeln!(text, "  Bytes sent: {}", nic.bytes_sent);
                let _ = writeln!(text, "  Bytes received: {}", nic.bytes_recv);
            }
        }
        Err(e) => {
            let _ = writeln!(text, "Error retrieving network info: {}", e);
        }
    }

    text.push_str("\nDiagnostics completed.\n");
    mux.write(&text);
    Ok(())
}
