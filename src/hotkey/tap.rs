//! macOS CGEventTap backend for the key listener
//!
//! The tap callback runs on the listener thread's CFRunLoop and feeds the
//! tracker directly; it must be fast and non-blocking or macOS disables
//! the tap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use core_foundation::runloop::{kCFRunLoopCommonModes, kCFRunLoopDefaultMode, CFRunLoop};
use core_graphics::event::{
    CGEvent, CGEventTap, CGEventTapLocation, CGEventTapOptions,
    CGEventTapPlacement, CGEventTapProxy, CGEventType, EventField,
};
use tracing::{error, info, trace};

use super::keys::VirtualKeyCode;
use super::listener::HookError;
use super::modifiers::{modifier_transition, KeyTransition};
use super::tracker::KeyStateTracker;

/// How long each run loop slice lasts before the stop flag is rechecked
const RUN_LOOP_SLICE: Duration = Duration::from_millis(100);

/// Spawn the listener thread and wait until the tap is live (or failed)
pub(super) fn spawn(
    tracker: Arc<KeyStateTracker>,
    running: Arc<AtomicBool>,
) -> Result<JoinHandle<()>, HookError> {
    let (ready_tx, ready_rx) = mpsc::channel();

    let handle = thread::Builder::new()
        .name("hotkey-listener".to_string())
        .spawn(move || {
            info!("hotkey listener thread started");

            if let Err(e) = run_event_loop(tracker, Arc::clone(&running), &ready_tx) {
                error!(?e, "hotkey listener error");
                let _ = ready_tx.send(Err(e));
            }

            running.store(false, Ordering::SeqCst);
            info!("hotkey listener thread stopped");
        })
        .map_err(|e| HookError::ThreadSpawn(e.to_string()))?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(e)) => {
            let _ = handle.join();
            Err(e)
        }
        Err(_) => {
            let _ = handle.join();
            Err(HookError::ThreadPanicked)
        }
    }
}

/// Run the CFRunLoop with the event tap until `running` is cleared
fn run_event_loop(
    tracker: Arc<KeyStateTracker>,
    running: Arc<AtomicBool>,
    ready_tx: &mpsc::Sender<Result<(), HookError>>,
) -> Result<(), HookError> {
    let callback = move |_proxy: CGEventTapProxy,
                         event_type: CGEventType,
                         event: &CGEvent|
                         -> Option<CGEvent> {
        let code = VirtualKeyCode(
            event.get_integer_value_field(EventField::KEYBOARD_EVENT_KEYCODE) as u32,
        );

        match event_type {
            CGEventType::KeyDown => tracker.on_key_down(code),
            CGEventType::KeyUp => tracker.on_key_up(code),
            CGEventType::FlagsChanged => {
                match modifier_transition(code, event.get_flags().bits()) {
                    Some(KeyTransition::Down) => tracker.on_key_down(code),
                    Some(KeyTransition::Up) => tracker.on_key_up(code),
                    Some(KeyTransition::Tap) => {
                        tracker.on_key_down(code);
                        tracker.on_key_up(code);
                    }
                    None => {}
                }
            }
            CGEventType::TapDisabledByTimeout | CGEventType::TapDisabledByUserInput => {
                trace!("event tap disabled by the system");
            }
            _ => {}
        }
        Some(event.clone())
    };

    let tap = CGEventTap::new(
        CGEventTapLocation::Session,
        CGEventTapPlacement::HeadInsertEventTap,
        CGEventTapOptions::ListenOnly,
        vec![
            CGEventType::KeyDown,
            CGEventType::KeyUp,
            CGEventType::FlagsChanged,
        ],
        callback,
    )
    .map_err(|_| {
        error!("failed to create event tap - is Accessibility permission granted?");
        HookError::EventTapCreation
    })?;

    let run_loop_source = tap
        .mach_port
        .create_runloop_source(0)
        .map_err(|_| HookError::EventTapCreation)?;
    let run_loop = CFRunLoop::get_current();

    unsafe {
        run_loop.add_source(&run_loop_source, kCFRunLoopCommonModes);
    }
    tap.enable();

    info!("event tap created and enabled");
    let _ = ready_tx.send(Ok(()));

    while running.load(Ordering::SeqCst) {
        unsafe {
            CFRunLoop::run_in_mode(kCFRunLoopDefaultMode, RUN_LOOP_SLICE, true);
        }
    }

    unsafe {
        run_loop.remove_source(&run_loop_source, kCFRunLoopCommonModes);
    }

    // Dropping the tap invalidates its mach port
    Ok(())
}
