// Terminal stand-ins for the platform permission prompt and popups

use std::io::{BufRead, Write};
use std::sync::Arc;

use async_trait::async_trait;
use cellarclub_core::{PermissionProvider, PermissionState, PlatformNotification, PlatformNotifier};
use parking_lot::Mutex;
use tokio::sync::oneshot;

type ReadAnswer = dyn Fn() -> std::io::Result<String> + Send + Sync;

/// Asks on stdin whether notifications may be shown
pub struct TerminalPermissionProvider {
    current: Mutex<PermissionState>,
    read_answer: Arc<ReadAnswer>,
}

impl TerminalPermissionProvider {
    pub fn new(initial: PermissionState) -> Self {
        Self::with_reader(initial, prompt_stdin)
    }

    pub fn with_reader(
        initial: PermissionState,
        read_answer: impl Fn() -> std::io::Result<String> + Send + Sync + 'static,
    ) -> Self {
        Self {
            current: Mutex::new(initial),
            read_answer: Arc::new(read_answer),
        }
    }
}

fn prompt_stdin() -> std::io::Result<String> {
    eprint!("Show notification popups in this terminal? [y/N] ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

/// y/yes grants, n/no denies, anything else leaves the prompt unanswered
pub fn parse_answer(line: &str) -> PermissionState {
    match line.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => PermissionState::Granted,
        "n" | "no" => PermissionState::Denied,
        _ => PermissionState::Default,
    }
}

#[async_trait]
impl PermissionProvider for TerminalPermissionProvider {
    fn current(&self) -> PermissionState {
        *self.current.lock()
    }

    async fn request(&self) -> PermissionState {
        // Plain thread: runtime shutdown must not wait on a prompt nobody answers
        let (tx, rx) = oneshot::channel();
        let read_answer = Arc::clone(&self.read_answer);
        std::thread::spawn(move || {
            let answer = read_answer()
                .map(|line| parse_answer(&line))
                .unwrap_or(PermissionState::Default);
            let _ = tx.send(answer);
        });
        let answer = rx.await.unwrap_or(PermissionState::Default);

        *self.current.lock() = answer;
        answer
    }
}

/// Prints platform notifications to stdout
#[derive(Debug, Default)]
pub struct ConsoleNotifier;

impl ConsoleNotifier {
    pub fn format(notification: &PlatformNotification) -> String {
        format!(
            "{}\n  {}\n  -> {}",
            notification.title,
            notification.body.replace('\n', "\n  "),
            notification.url
        )
    }
}

impl PlatformNotifier for ConsoleNotifier {
    fn show(&self, notification: &PlatformNotification) {
        println!("{}", Self::format(notification));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellarclub_core::{Notification, NotificationDraft};
    use std::time::{Duration, Instant};
    use uuid::Uuid;

    #[test]
    fn test_parse_answer() {
        assert_eq!(parse_answer("y\n"), PermissionState::Granted);
        assert_eq!(parse_answer(" YES "), PermissionState::Granted);
        assert_eq!(parse_answer("n"), PermissionState::Denied);
        assert_eq!(parse_answer(""), PermissionState::Default);
        assert_eq!(parse_answer("later"), PermissionState::Default);
    }

    #[tokio::test]
    async fn test_request_records_answer() {
        let provider =
            TerminalPermissionProvider::with_reader(PermissionState::Default, || Ok("yes\n".into()));
        assert_eq!(provider.request().await, PermissionState::Granted);
        assert_eq!(provider.current(), PermissionState::Granted);

        let failing = TerminalPermissionProvider::with_reader(PermissionState::Default, || {
            Err(std::io::Error::other("stdin closed"))
        });
        assert_eq!(failing.request().await, PermissionState::Default);
    }

    #[test]
    fn test_abandoned_prompt_does_not_hold_runtime_shutdown() {
        let (release, pending) = std::sync::mpsc::channel::<()>();
        let pending = Mutex::new(pending);
        let provider = TerminalPermissionProvider::with_reader(PermissionState::Default, move || {
            let _ = pending.lock().recv();
            Ok(String::new())
        });

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();
        let answered = runtime.block_on(async {
            tokio::time::timeout(Duration::from_millis(50), provider.request()).await
        });
        assert!(answered.is_err());
        assert_eq!(provider.current(), PermissionState::Default);

        let started = Instant::now();
        drop(runtime);
        assert!(started.elapsed() < Duration::from_secs(1));
        drop(release);
    }

    #[test]
    fn test_console_format() {
        let n = Notification::from_draft(
            Uuid::now_v7(),
            &NotificationDraft::new_event("Harvest Dinner", "October 4"),
        );
        let text = ConsoleNotifier::format(&n.to_platform());
        assert!(text.starts_with("📅 New Event"));
        assert!(text.contains("\n  New Event Added\n  A new event"));
        assert!(text.ends_with("-> /events"));
    }
}
