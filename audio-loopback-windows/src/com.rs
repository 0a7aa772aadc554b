//! Thread-scoped COM and MMCSS registrations.

use windows::core::w;
use windows::Win32::Foundation::HANDLE;
use windows::Win32::System::Com::{CoInitializeEx, CoUninitialize, COINIT_MULTITHREADED};
use windows::Win32::System::Threading::{AvRevertMmThreadCharacteristics, AvSetMmThreadCharacteristicsW};

use audio_loopback_core::models::error::LoopbackError;

/// COM initialized (MTA) on the current thread. Calls `CoUninitialize` on drop.
///
/// Must outlive every COM interface created on the thread.
pub struct ComGuard {
    _not_send: std::marker::PhantomData<*const ()>,
}

impl ComGuard {
    pub fn initialize() -> Result<Self, LoopbackError> {
        unsafe {
            CoInitializeEx(None, COINIT_MULTITHREADED)
                .ok()
                .map_err(|e| LoopbackError::Unknown(format!("CoInitializeEx failed: {}", e)))?;
        }
        Ok(Self {
            _not_send: std::marker::PhantomData,
        })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        unsafe {
            CoUninitialize();
        }
    }
}

/// The current thread registered as an MMCSS "Pro Audio" task.
pub struct MmcssRegistration {
    handle: HANDLE,
    task_index: u32,
}

impl MmcssRegistration {
    /// Register the calling thread. Returns `None` (and logs) if the
    /// scheduler refuses; streaming still works at normal priority.
    pub fn register() -> Option<Self> {
        let mut task_index: u32 = 0;
        match unsafe { AvSetMmThreadCharacteristicsW(w!("Pro Audio"), &mut task_index) } {
            Ok(handle) => {
                log::debug!("Registered with MMCSS as Pro Audio (task {})", task_index);
                Some(Self { handle, task_index })
            }
            Err(e) => {
                log::warn!("AvSetMmThreadCharacteristicsW failed: {}", e);
                None
            }
        }
    }

    pub fn task_index(&self) -> u32 {
        self.task_index
    }
}

impl Drop for MmcssRegistration {
    fn drop(&mut self) {
        if let Err(e) = unsafe { AvRevertMmThreadCharacteristics(self.handle) } {
            log::warn!("AvRevertMmThreadCharacteristics failed: {}", e);
        }
    }
}
