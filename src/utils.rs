use std::env;
use std::path::PathBuf;

/// Renders a byte count with binary units, e.g. `1.5 KB` or `3 GB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let rendered = format!("{:.2}", value);
    let rendered = rendered.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", rendered, UNITS[unit])
}

/// OS-defined folders the scanner and cleanup engine operate on.
///
/// Everything is resolved from the environment except the machine temp root,
/// which is a fixed path.
#[derive(Debug, Clone, Default)]
pub struct KnownFolders {
    pub roaming_data: Option<PathBuf>,
    pub local_data: Option<PathBuf>,
    pub machine_data: Option<PathBuf>,
    pub desktop: Option<PathBuf>,
    pub start_menu: Option<PathBuf>,
    pub user_temp: PathBuf,
    pub system_temp: PathBuf,
}

impl KnownFolders {
    pub fn detect() -> Self {
        let roaming_data = dirs::data_dir();
        let folders = Self {
            start_menu: start_menu_dir(roaming_data.as_ref()),
            roaming_data,
            local_data: dirs::data_local_dir(),
            machine_data: machine_data_dir(),
            desktop: dirs::desktop_dir(),
            user_temp: env::temp_dir(),
            system_temp: system_temp_dir(),
        };
        log::debug!("Resolved known folders: {:?}", folders);
        folders
    }
}

#[cfg(windows)]
fn machine_data_dir() -> Option<PathBuf> {
    env::var_os("ProgramData")
        .map(PathBuf::from)
        .or_else(|| Some(PathBuf::from(r"C:\ProgramData")))
}

#[cfg(not(windows))]
fn machine_data_dir() -> Option<PathBuf> {
    None
}

#[cfg(windows)]
fn start_menu_dir(roaming: Option<&PathBuf>) -> Option<PathBuf> {
    roaming.map(|dir| dir.join("Microsoft").join("Windows").join("Start Menu"))
}

#[cfg(not(windows))]
fn start_menu_dir(_roaming: Option<&PathBuf>) -> Option<PathBuf> {
    None
}

#[cfg(windows)]
fn system_temp_dir() -> PathBuf {
    PathBuf::from(r"C:\Windows\Temp")
}

#[cfg(not(windows))]
fn system_temp_dir() -> PathBuf {
    PathBuf::from("/var/tmp")
}

/// Checks if the current process runs with administrator (or root) rights.
pub fn is_elevated() -> bool {
    #[cfg(windows)]
    {
        crate::platform::windows::is_user_an_admin()
    }
    #[cfg(unix)]
    {
        // SAFETY: geteuid has no preconditions and cannot fail.
        unsafe { libc::geteuid() == 0 }
    }
    #[cfg(not(any(windows, unix)))]
    {
        false
    }
}
