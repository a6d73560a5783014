//! One-time state shared by every poll: the hardware-counter toggle and the
//! hardware-counter enablement guard.
//!
//! Both live for the whole process in production ([`HarvestContext::process`]),
//! but the poller only ever sees them through an owned [`HarvestContext`], so
//! tests can hand each case a fresh pair.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::HarvestError;
use crate::os::OsInterface;
use crate::toggle::{DEFAULT_TOGGLE_VAR, FeatureToggle};

/// Guard around the privileged "enable hardware counters" command.
///
/// The check and the enable call happen under the same lock, so two threads
/// can never both issue the command.
#[derive(Debug, Default)]
pub struct HwCounterInit {
    initialized: Mutex<bool>,
}

impl HwCounterInit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issue the enable command if no caller has done so successfully yet.
    ///
    /// A failed enable leaves the guard unset; a later poll tries again.
    pub fn ensure_enabled(&self, os: &dyn OsInterface) -> Result<(), HarvestError> {
        let mut initialized = self.initialized.lock().unwrap_or_else(|e| e.into_inner());
        if *initialized {
            return Ok(());
        }
        os.enable_hw_counters()?;
        *initialized = true;
        log::info!("hardware counters enabled");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        *self.initialized.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Shared one-time state injected into an [`crate::EntropyPoller`].
#[derive(Debug, Clone)]
pub struct HarvestContext {
    pub toggle: Arc<FeatureToggle>,
    pub hw_init: Arc<HwCounterInit>,
}

impl HarvestContext {
    pub fn new(toggle: FeatureToggle) -> Self {
        Self {
            toggle: Arc::new(toggle),
            hw_init: Arc::new(HwCounterInit::new()),
        }
    }

    /// The process-wide pair. The toggle reads [`DEFAULT_TOGGLE_VAR`].
    pub fn process() -> Self {
        Self::for_var(DEFAULT_TOGGLE_VAR)
    }

    /// Process-wide context gated by `var`. Every call with the same name
    /// gets the same toggle, so the variable is read at most once per
    /// process. The enablement guard is shared by all names.
    pub fn for_var(var: &str) -> Self {
        static TOGGLES: OnceLock<Mutex<HashMap<String, Arc<FeatureToggle>>>> = OnceLock::new();
        static HW_INIT: OnceLock<Arc<HwCounterInit>> = OnceLock::new();

        let mut toggles = TOGGLES
            .get_or_init(Default::default)
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let toggle = toggles
            .entry(var.to_string())
            .or_insert_with(|| Arc::new(FeatureToggle::from_env(var)));
        Self {
            toggle: Arc::clone(toggle),
            hw_init: Arc::clone(HW_INIT.get_or_init(|| Arc::new(HwCounterInit::new()))),
        }
    }
}
