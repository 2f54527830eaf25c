//! Windows shell and volume primitives.
//!
//! This module wraps the handful of Win32 calls the cleanup engine needs:
//! measuring and emptying the recycle bin, finding fixed drives and checking
//! for an administrator token.

use std::io;
use std::os::windows::prelude::OsStrExt;
use std::path::PathBuf;

use windows_sys::Win32::Storage::FileSystem::{GetDriveTypeW, GetLogicalDrives};
use windows_sys::Win32::UI::Shell::{
    IsUserAnAdmin, SHEmptyRecycleBinW, SHQueryRecycleBinW, SHERB_NOCONFIRMATION,
    SHERB_NOPROGRESSUI, SHERB_NOSOUND, SHQUERYRBINFO,
};

use super::{RecycleBinFlags, RecycleBinUsage};

/// `DRIVE_FIXED` from WinBase.h.
const DRIVE_FIXED: u32 = 3;

/// Empties the recycle bin of every drive through `SHEmptyRecycleBinW`.
pub fn empty_recycle_bin(flags: RecycleBinFlags) -> io::Result<()> {
    let mut raw = 0u32;
    if flags.no_confirmation {
        raw |= SHERB_NOCONFIRMATION;
    }
    if flags.no_progress_ui {
        raw |= SHERB_NOPROGRESSUI;
    }
    if flags.no_sound {
        raw |= SHERB_NOSOUND;
    }

    // A null root path targets the recycle bins of all drives.
    let hresult = unsafe { SHEmptyRecycleBinW(std::ptr::null_mut(), std::ptr::null(), raw) };

    if hresult == 0 {
        Ok(())
    } else {
        Err(io::Error::other(format!(
            "SHEmptyRecycleBinW failed with HRESULT {:#010X}",
            hresult as u32
        )))
    }
}

/// Size and item count of the recycle bins of every drive.
pub fn query_recycle_bin() -> io::Result<RecycleBinUsage> {
    let mut info = SHQUERYRBINFO {
        cbSize: std::mem::size_of::<SHQUERYRBINFO>() as u32,
        i64Size: 0,
        i64NumItems: 0,
    };

    let hresult = unsafe { SHQueryRecycleBinW(std::ptr::null(), &mut info) };

    if hresult == 0 {
        Ok(RecycleBinUsage {
            bytes: info.i64Size.max(0) as u64,
            items: info.i64NumItems.max(0) as u64,
        })
    } else {
        Err(io::Error::other(format!(
            "SHQueryRecycleBinW failed with HRESULT {:#010X}",
            hresult as u32
        )))
    }
}

/// Root paths (`C:\`, `D:\`, ...) of all fixed drives.
pub fn fixed_drive_roots() -> Vec<PathBuf> {
    let mask = unsafe { GetLogicalDrives() };
    let mut roots = Vec::new();

    for (index, letter) in ('A'..='Z').enumerate() {
        if mask & (1 << index) == 0 {
            continue;
        }
        let root = format!("{}:\\", letter);
        let wide: Vec<u16> = std::ffi::OsStr::new(&root)
            .encode_wide()
            .chain(Some(0))
            .collect();
        let drive_type = unsafe { GetDriveTypeW(wide.as_ptr()) };
        if drive_type == DRIVE_FIXED {
            roots.push(PathBuf::from(root));
        }
    }

    roots
}

pub fn is_user_an_admin() -> bool {
    unsafe { IsUserAnAdmin() != 0 }
}
