use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::UiConfig;

/// Transient layout flags; nothing here is persisted.
#[derive(Serialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UiFlags {
    pub is_mobile_menu: bool,
    pub is_menu_open: bool,
    // Pulse flags, true for one animation window after the menu opens/closes
    pub is_menu_opening: bool,
    pub is_menu_closing: bool,
}

/// Menu and breakpoint state for the app shell.
///
/// Opening or closing the menu raises a pulse flag for `UiConfig::menu_pulse`.
/// Only one pulse timer exists at a time: a new transition aborts the pending
/// one, so an earlier timer can never clear a later pulse early.
pub struct AppUiStore {
    flags: Arc<Mutex<UiFlags>>,
    config: UiConfig,
    pulse: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

fn lock(flags: &Mutex<UiFlags>) -> MutexGuard<'_, UiFlags> {
    flags.lock().unwrap_or_else(PoisonError::into_inner)
}

fn apply_resize(flags: &Mutex<UiFlags>, width: u32, breakpoint: u32) {
    let mut flags = lock(flags);
    let is_mobile = width <= breakpoint;
    if flags.is_mobile_menu != is_mobile {
        log::debug!("Viewport {}px, mobile menu: {}", width, is_mobile);
    }
    flags.is_mobile_menu = is_mobile;
}

impl AppUiStore {
    /// The menu starts open on wide viewports and closed on narrow ones.
    pub fn new(viewport_width: u32, config: UiConfig) -> Self {
        let is_mobile = viewport_width <= config.mobile_breakpoint;
        let flags = UiFlags {
            is_mobile_menu: is_mobile,
            is_menu_open: !is_mobile,
            ..UiFlags::default()
        };
        Self {
            flags: Arc::new(Mutex::new(flags)),
            config,
            pulse: None,
            listener: None,
        }
    }

    pub fn flags(&self) -> UiFlags {
        *lock(&self.flags)
    }

    pub fn on_resize(&self, viewport_width: u32) {
        apply_resize(&self.flags, viewport_width, self.config.mobile_breakpoint);
    }

    /// Must be called from within a tokio runtime.
    pub fn set_menu_open(&mut self, open: bool) {
        {
            let mut flags = lock(&self.flags);
            if flags.is_menu_open == open {
                return;
            }
            flags.is_menu_open = open;
            flags.is_menu_opening = open;
            flags.is_menu_closing = !open;
        }

        if let Some(pending) = self.pulse.take() {
            pending.abort();
        }
        let flags = self.flags.clone();
        let window = self.config.menu_pulse;
        self.pulse = Some(tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let mut flags = lock(&flags);
            flags.is_menu_opening = false;
            flags.is_menu_closing = false;
        }));
    }

    pub fn toggle_menu(&mut self) {
        let open = !self.flags().is_menu_open;
        self.set_menu_open(open);
    }

    /// Follows viewport widths published on `widths` until [`AppUiStore::unmount`].
    pub fn mount(&mut self, mut widths: watch::Receiver<u32>) {
        if let Some(previous) = self.listener.take() {
            previous.abort();
        }

        let current = *widths.borrow_and_update();
        self.on_resize(current);

        let flags = self.flags.clone();
        let breakpoint = self.config.mobile_breakpoint;
        self.listener = Some(tokio::spawn(async move {
            while widths.changed().await.is_ok() {
                let width = *widths.borrow_and_update();
                apply_resize(&flags, width, breakpoint);
            }
        }));
    }

    /// Detaches the resize listener and drops any pending pulse.
    pub fn unmount(&mut self) {
        if let Some(listener) = self.listener.take() {
            listener.abort();
        }
        if let Some(pending) = self.pulse.take() {
            pending.abort();
            let mut flags = lock(&self.flags);
            flags.is_menu_opening = false;
            flags.is_menu_closing = false;
        }
    }
}

impl Drop for AppUiStore {
    fn drop(&mut self) {
        self.unmount();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    fn config() -> UiConfig {
        UiConfig::default()
    }

    #[test]
    fn initial_menu_state_follows_viewport() {
        let wide = AppUiStore::new(1280, config());
        let narrow = AppUiStore::new(1024, config());

        assert!(wide.flags().is_menu_open);
        assert!(!wide.flags().is_mobile_menu);
        assert!(!narrow.flags().is_menu_open);
        assert!(narrow.flags().is_mobile_menu);
    }

    #[test]
    fn breakpoint_is_inclusive() {
        let store = AppUiStore::new(1280, config());

        store.on_resize(1024);
        assert!(store.flags().is_mobile_menu);
        store.on_resize(1025);
        assert!(!store.flags().is_mobile_menu);
    }

    #[tokio::test(start_paused = true)]
    async fn closing_pulse_clears_after_window() {
        let mut store = AppUiStore::new(1280, config());

        store.set_menu_open(false);
        let flags = store.flags();
        assert!(!flags.is_menu_open);
        assert!(flags.is_menu_closing);
        assert!(!flags.is_menu_opening);

        sleep(Duration::from_millis(299)).await;
        assert!(store.flags().is_menu_closing);

        sleep(Duration::from_millis(2)).await;
        assert!(!store.flags().is_menu_closing);
    }

    #[tokio::test(start_paused = true)]
    async fn no_transition_means_no_pulse() {
        let mut store = AppUiStore::new(1280, config());

        store.set_menu_open(true);

        assert!(!store.flags().is_menu_opening);
        assert!(store.pulse.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn new_transition_cancels_pending_pulse() {
        let mut store = AppUiStore::new(1280, config());

        store.set_menu_open(false);
        sleep(Duration::from_millis(200)).await;
        store.toggle_menu();

        // The first timer would have fired at 300ms
        sleep(Duration::from_millis(150)).await;
        let flags = store.flags();
        assert!(flags.is_menu_open);
        assert!(flags.is_menu_opening);
        assert!(!flags.is_menu_closing);

        sleep(Duration::from_millis(151)).await;
        assert!(!store.flags().is_menu_opening);
    }

    #[tokio::test(start_paused = true)]
    async fn mounted_listener_tracks_resizes_until_unmount() {
        let mut store = AppUiStore::new(1280, config());
        let (tx, rx) = watch::channel(1280);

        store.mount(rx);
        tx.send(800).unwrap();
        sleep(Duration::from_millis(1)).await;
        assert!(store.flags().is_mobile_menu);

        store.unmount();
        let _ = tx.send(1600);
        sleep(Duration::from_millis(1)).await;
        assert!(store.flags().is_mobile_menu);
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_drops_pending_pulse() {
        let mut store = AppUiStore::new(1280, config());
        store.set_menu_open(false);

        store.unmount();

        assert!(!store.flags().is_menu_closing);
        assert!(!store.flags().is_menu_open);
    }
}
