/// Host introspection
/// Memory, process, disk and network readers behind the system built-ins.
/// Linux data comes from procfs; identity, disk usage and signals go through libc.

use crate::error::CommandError;
use std::fs;
use std::path::Path;

const PROC: &str = "/proc";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OsIdentity {
    pub sysname: String,
    pub release: String,
    pub version: String,
    pub machine: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemoryInfo {
    pub total: u64,
    pub available: u64,
    pub swap_total: u64,
    pub swap_free: u64,
}

impl MemoryInfo {
    pub fn used(&self) -> u64 {
        self.total.saturating_sub(self.available)
    }

    pub fn percent(&self) -> f64 {
        percent(self.used(), self.total)
    }

    pub fn swap_used(&self) -> u64 {
        self.swap_total.saturating_sub(self.swap_free)
    }

    pub fn swap_percent(&self) -> f64 {
        percent(self.swap_used(), self.swap_total)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: i32,
    pub ppid: i32,
    pub name: String,
    pub cpu_percent: f64,
    pub mem_percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskUsage {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
}

impl DiskUsage {
    pub fn percent(&self) -> f64 {
        percent(self.used, self.used + self.free)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetCounters {
    pub interface: String,
    pub bytes_recv: u64,
    pub bytes_sent: u64,
}

/// Fields of `/proc/<pid>/stat` the process listing needs
#[derive(Debug, Clone, PartialEq)]
struct ProcStat {
    pid: i32,
    name: String,
    ppid: i32,
    /// utime + stime in clock ticks
    cpu_ticks: u64,
    start_ticks: u64,
    rss_pages: u64,
}

pub fn percent(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        (part as f64 / whole as f64 * 1000.0).round() / 10.0
    }
}

pub fn megabytes(bytes: u64) -> u64 {
    bytes / (1024 * 1024)
}

fn read_proc(path: &str) -> Result<String, CommandError> {
    fs::read_to_string(path)
        .map_err(|e| CommandError::Introspection(format!("Cannot read {}: {}", path, e)))
}

// ============================================================================
// Identity
// ============================================================================

#[cfg(unix)]
pub fn os_identity() -> OsIdentity {
    fn field(raw: &[libc::c_char]) -> String {
        let bytes: Vec<u8> = raw
            .iter()
            .take_while(|&&c| c != 0)
            .map(|&c| c as u8)
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    let mut name: libc::utsname = unsafe { std::mem::zeroed() };
    if unsafe { libc::uname(&mut name) } != 0 {
        return fallback_identity();
    }
    OsIdentity {
        sysname: field(&name.sysname),
        release: field(&name.release),
        version: field(&name.version),
        machine: field(&name.machine),
    }
}

#[cfg(not(unix))]
pub fn os_identity() -> OsIdentity {
    fallback_identity()
}

fn fallback_identity() -> OsIdentity {
    OsIdentity {
        sysname: std::env::consts::OS.to_string(),
        machine: std::env::consts::ARCH.to_string(),
        ..OsIdentity::default()
    }
}

// ============================================================================
// Memory
// ============================================================================

pub fn memory() -> Result<MemoryInfo, CommandError> {
    parse_meminfo(&read_proc("/proc/meminfo")?)
}

fn parse_meminfo(content: &str) -> Result<MemoryInfo, CommandError> {
    let mut info = MemoryInfo::default();
    let mut free = None;
    let mut buffers_cached = 0u64;
    let mut available = None;

    for line in content.lines() {
        let mut parts = line.split_whitespace();
        let (Some(key), Some(value)) = (parts.next(), parts.next()) else {
            continue;
        };
        let Ok(kib) = value.parse::<u64>() else {
            continue;
        };
        let bytes = kib * 1024;
        match key {
            "MemTotal:" => info.total = bytes,
            "MemAvailable:" => available = Some(bytes),
            "MemFree:" => free = Some(bytes),
            "Buffers:" | "Cached:" => buffers_cached += bytes,
            "SwapTotal:" => info.swap_total = bytes,
            "SwapFree:" => info.swap_free = bytes,
            _ => {}
        }
    }

    if info.total == 0 {
        return Err(CommandError::Introspection(
            "MemTotal missing from /proc/meminfo".to_string(),
        ));
    }
    // kernels before 3.14 have no MemAvailable
    info.available = available.unwrap_or_else(|| free.unwrap_or(0) + buffers_cached);
    Ok(info)
}

// ============================================================================
// Processes
// ============================================================================

pub fn processes() -> Result<Vec<ProcessInfo>, CommandError> {
    let entries = fs::read_dir(PROC)
        .map_err(|e| CommandError::Introspection(format!("Cannot list {}: {}", PROC, e)))?;
    let mem_total = memory().map(|m| m.total).unwrap_or(0);
    let uptime_secs = read_proc("/proc/uptime")
        .ok()
        .and_then(|s| s.split_whitespace().next()?.parse::<f64>().ok())
        .unwrap_or(0.0);
    let (ticks_per_sec, page_size) = clock_and_page_size();

    let mut list: Vec<ProcessInfo> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().into_string().ok())
        .filter_map(|name| name.parse::<i32>().ok())
        // processes can vanish between listing and reading
        .filter_map(|pid| fs::read_to_string(format!("{}/{}/stat", PROC, pid)).ok())
        .filter_map(|content| parse_stat(&content))
        .map(|stat| {
            let elapsed = uptime_secs - stat.start_ticks as f64 / ticks_per_sec;
            let cpu_secs = stat.cpu_ticks as f64 / ticks_per_sec;
            let cpu_percent = if elapsed > 0.0 {
                (cpu_secs / elapsed * 1000.0).round() / 10.0
            } else {
                0.0
            };
            ProcessInfo {
                pid: stat.pid,
                ppid: stat.ppid,
                name: stat.name,
                cpu_percent,
                mem_percent: percent(stat.rss_pages * page_size, mem_total),
            }
        })
        .collect();

    list.sort_by_key(|p| p.pid);
    Ok(list)
}

pub fn parent_pid(pid: i32) -> Option<i32> {
    let content = fs::read_to_string(format!("{}/{}/stat", PROC, pid)).ok()?;
    parse_stat(&content).map(|stat| stat.ppid)
}

/// Whether `pid` is `ancestor` or one of its descendants.
pub fn is_descendant_of(pid: i32, ancestor: i32) -> bool {
    let mut current = pid;
    // bounded walk in case procfs reports a cycle mid-update
    for _ in 0..64 {
        if current == ancestor {
            return true;
        }
        match parent_pid(current) {
            Some(parent) if parent > 0 && parent != current => current = parent,
            _ => return false,
        }
    }
    false
}

fn parse_stat(content: &str) -> Option<ProcStat> {
    // comm may contain spaces and parens; it spans to the last ')'
    let open = content.find('(')?;
    let close = content.rfind(')')?;
    let pid = content[..open].trim().parse().ok()?;
    let name = content[open + 1..close].to_string();
    let fields: Vec<&str> = content[close + 1..].split_whitespace().collect();
    // fields[0] is state (field 3 in proc(5))
    let num = |i: usize| fields.get(i).and_then(|f| f.parse::<u64>().ok());
    Some(ProcStat {
        pid,
        name,
        ppid: fields.get(1)?.parse().ok()?,
        cpu_ticks: num(11)? + num(12)?,
        start_ticks: num(19)?,
        rss_pages: num(21)?,
    })
}

#[cfg(unix)]
fn clock_and_page_size() -> (f64, u64) {
    let ticks = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    let page = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    (
        if ticks > 0 { ticks as f64 } else { 100.0 },
        if page > 0 { page as u64 } else { 4096 },
    )
}

#[cfg(not(unix))]
fn clock_and_page_size() -> (f64, u64) {
    (100.0, 4096)
}

/// Send SIGTERM to `pid`.
#[cfg(unix)]
pub fn terminate_process(pid: i32) -> Result<(), CommandError> {
    if pid <= 0 {
        return Err(CommandError::InvalidPid);
    }
    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        return Ok(());
    }
    let err = std::io::Error::last_os_error();
    match err.raw_os_error() {
        Some(libc::ESRCH) => Err(CommandError::NoSuchProcess(pid)),
        Some(libc::EPERM) => Err(CommandError::PermissionDenied(format!("PID {}", pid))),
        _ => Err(CommandError::Io(err)),
    }
}

#[cfg(not(unix))]
pub fn terminate_process(_pid: i32) -> Result<(), CommandError> {
    Err(CommandError::Introspection(
        "Signals are not supported on this platform".to_string(),
    ))
}

// ============================================================================
// Disks
// ============================================================================

pub fn disks() -> Result<Vec<DiskUsage>, CommandError> {
    let mounts = parse_mounts(&read_proc("/proc/mounts")?);
    Ok(mounts
        .into_iter()
        .filter_map(|(device, mountpoint, fstype)| {
            match disk_usage(Path::new(&mountpoint)) {
                Some((total, used, free)) => Some(DiskUsage {
                    device,
                    mountpoint,
                    fstype,
                    total,
                    used,
                    free,
                }),
                None => {
                    log::debug!("statvfs failed for {}", mountpoint);
                    None
                }
            }
        })
        .collect())
}

/// Physical mounts as (device, mountpoint, fstype), first mount of each point wins.
fn parse_mounts(content: &str) -> Vec<(String, String, String)> {
    let mut seen = std::collections::HashSet::new();
    content
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            Some((parts.next()?, parts.next()?, parts.next()?))
        })
        .filter(|(device, _, _)| device.starts_with('/'))
        .filter(|(_, mountpoint, _)| seen.insert(mountpoint.to_string()))
        .map(|(device, mountpoint, fstype)| {
            (
                device.to_string(),
                // /proc/mounts octal-escapes spaces
                mountpoint.replace("\\040", " "),
                fstype.to_string(),
            )
        })
        .collect()
}

#[cfg(unix)]
fn disk_usage(path: &Path) -> Option<(u64, u64, u64)> {
    use std::os::unix::ffi::OsStrExt;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes()).ok()?;
    let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
    if unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) } != 0 {
        return None;
    }
    let frsize = stat.f_frsize as u64;
    let total = stat.f_blocks as u64 * frsize;
    let free = stat.f_bavail as u64 * frsize;
    let used = total.saturating_sub(stat.f_bfree as u64 * frsize);
    Some((total, used, free))
}

#[cfg(not(unix))]
fn disk_usage(_path: &Path) -> Option<(u64, u64, u64)> {
    None
}

// ============================================================================
// Network
// ============================================================================

pub fn network() -> Result<Vec<NetCounters>, CommandError> {
    Ok(parse_net_dev(&read_proc("/proc/net/dev")?))
}

fn parse_net_dev(content: &str) -> Vec<NetCounters> {
    content
        .lines()
        .filter_map(|line| {
            let (name, rest) = line.split_once(':')?;
            let fields: Vec<u64> = rest
                .split_whitespace()
                .filter_map(|f| f.parse().ok())
                .collect();
            if fields.len() < 9 {
                return None;
            }
            Some(NetCounters {
                interface: name.trim().to_string(),
                bytes_recv: fields[0],
                bytes_sent: fields[8],
            })
        })
        .collect()
}
