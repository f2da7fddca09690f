use std::thread;

use super::{DriverTiming, Handle, Surface};
use crate::keys::{Key, KeyToken};

/// One way of getting text into a target. Strategies are tried in order
/// until one reports success.
pub trait InjectStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Deliver `payload` without submitting it
    fn deliver(&self, surface: &dyn Surface, handle: &Handle, payload: &str) -> bool;
}

/// Type the payload through the surface's typing channel
pub struct TypeKeys;

impl InjectStrategy for TypeKeys {
    fn name(&self) -> &'static str {
        "type"
    }

    fn deliver(&self, surface: &dyn Surface, handle: &Handle, payload: &str) -> bool {
        match surface.type_text(handle, payload) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(handle = %handle, error = %e, "typing failed");
                false
            }
        }
    }
}

/// Put the payload on the clipboard and paste it
pub struct ClipboardPaste;

impl InjectStrategy for ClipboardPaste {
    fn name(&self) -> &'static str {
        "clipboard"
    }

    fn deliver(&self, surface: &dyn Surface, handle: &Handle, payload: &str) -> bool {
        let result = surface
            .set_clipboard(payload)
            .and_then(|_| surface.paste(handle));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(handle = %handle, error = %e, "clipboard paste failed");
                false
            }
        }
    }
}

/// Bring the target forward, retrying once if the check fails
pub(super) fn activate(surface: &dyn Surface, handle: &Handle, timing: DriverTiming) -> bool {
    for _ in 0..2 {
        if let Err(e) = surface.activate(handle) {
            tracing::debug!(handle = %handle, error = %e, "activation request failed");
        }
        thread::sleep(timing.settle);
        if surface.is_foreground(handle) {
            return true;
        }
    }
    false
}

pub(super) fn run_chain(
    surface: &dyn Surface,
    strategies: &[Box<dyn InjectStrategy>],
    handle: &Handle,
    payload: &str,
    timing: DriverTiming,
) -> bool {
    for strategy in strategies {
        if !activate(surface, handle, timing) {
            tracing::warn!(handle = %handle, "could not verify foreground, sending anyway");
        }

        if !strategy.deliver(surface, handle, payload) {
            continue;
        }

        // Submit through the key primitive whichever channel typed the text.
        thread::sleep(timing.key_pause);
        if let Err(e) = surface.send_key(handle, Key::Enter) {
            tracing::warn!(handle = %handle, error = %e, "submit key failed after delivery");
        }
        tracing::info!(
            handle = %handle,
            channel = strategy.name(),
            chars = payload.chars().count(),
            "payload injected"
        );
        return true;
    }

    tracing::error!(handle = %handle, "every injection channel failed");
    false
}

pub(super) fn send_tokens(
    surface: &dyn Surface,
    handle: &Handle,
    tokens: &[KeyToken],
    timing: DriverTiming,
) -> bool {
    if !activate(surface, handle, timing) {
        tracing::warn!(handle = %handle, "could not verify foreground, sending anyway");
    }

    for token in tokens {
        let sent = match token {
            KeyToken::Key(key) => surface.send_key(handle, *key),
            KeyToken::Text(text) => text.chars().try_for_each(|ch| surface.send_char(handle, ch)),
        };
        if let Err(e) = sent {
            tracing::error!(handle = %handle, token = %token, error = %e, "key send failed");
            return false;
        }
        thread::sleep(timing.key_pause);
    }

    tracing::info!(handle = %handle, count = tokens.len(), "keys sent");
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::InputDriver;
    use crate::testing::{FakeSurface, Typed};
    use std::sync::Arc;
    use std::time::Duration;

    fn quick() -> DriverTiming {
        DriverTiming {
            settle: Duration::ZERO,
            key_pause: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_typing_channel_then_submit() {
        let surface = Arc::new(FakeSurface::new(&["✳ Claude Code"]));
        let driver = InputDriver::new(surface.clone(), quick());
        let h = surface.handle();

        assert!(driver.inject(&h, "hello").await);
        assert_eq!(
            surface.typed(),
            vec![Typed::Text("hello".into()), Typed::Key(Key::Enter)]
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_clipboard() {
        let surface = Arc::new(FakeSurface::new(&["✳ Claude Code"]));
        surface.fail_typing(true);
        let driver = InputDriver::new(surface.clone(), quick());
        let h = surface.handle();

        assert!(driver.inject(&h, "hello").await);
        assert_eq!(
            surface.typed(),
            vec![Typed::Pasted("hello".into()), Typed::Key(Key::Enter)]
        );
        // one activation cycle per channel attempt
        assert_eq!(surface.activations(), 2);
    }

    #[tokio::test]
    async fn test_fails_when_every_channel_fails() {
        let surface = Arc::new(FakeSurface::new(&["✳ Claude Code"]));
        surface.fail_typing(true);
        surface.fail_paste(true);
        let driver = InputDriver::new(surface.clone(), quick());

        assert!(!driver.inject(&surface.handle(), "hello").await);
        assert!(surface.typed().is_empty());
    }

    #[tokio::test]
    async fn test_activation_retries_once() {
        let surface = Arc::new(FakeSurface::new(&["✳ Claude Code"]));
        surface.set_foreground(false);
        let driver = InputDriver::new(surface.clone(), quick());

        assert!(driver.inject(&surface.handle(), "x").await);
        assert_eq!(surface.activations(), 2);
    }

    #[tokio::test]
    async fn test_raw_keys_have_no_submit() {
        let surface = Arc::new(FakeSurface::new(&["✳ Claude Code"]));
        let driver = InputDriver::new(surface.clone(), quick());
        let tokens = crate::keys::parse_tokens("down ok");

        assert!(driver.inject_raw_keys(&surface.handle(), tokens).await);
        assert_eq!(
            surface.typed(),
            vec![
                Typed::Key(Key::Down),
                Typed::Char('o'),
                Typed::Char('k'),
            ]
        );
    }
}
