use ciwarden::core::config::WardenConfig;
use ciwarden::core::error::WardenError;
use ciwarden::plugins::notify::{Dispatcher, FileChannel, Notification, NotificationChannel};
use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use tempfile::tempdir;

struct RecordingChannel {
    seen: Rc<RefCell<Vec<String>>>,
}

impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn deliver(&self, notification: &Notification) -> Result<(), WardenError> {
        self.seen.borrow_mut().push(notification.body.clone());
        Ok(())
    }
}

struct BrokenChannel;

impl NotificationChannel for BrokenChannel {
    fn name(&self) -> &str {
        "broken"
    }

    fn deliver(&self, _notification: &Notification) -> Result<(), WardenError> {
        Err(WardenError::ValidationError("webhook rejected payload".to_string()))
    }
}

fn note(body: &str) -> Notification {
    Notification {
        title: "CI guidance".to_string(),
        body: body.to_string(),
    }
}

#[test]
fn test_failing_channel_is_reported_and_others_still_deliver() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let dispatcher = Dispatcher::new()
        .with_channel(Box::new(BrokenChannel))
        .with_channel(Box::new(RecordingChannel { seen: seen.clone() }));

    let report = dispatcher.dispatch(&note("[ciwarden] cli: Run the cli test suites"));
    assert!(!report.all_delivered());
    assert_eq!(report.delivered, vec!["recording"]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "broken");
    assert!(report.failed[0].1.contains("webhook rejected payload"));
    assert_eq!(*seen.borrow(), vec!["[ciwarden] cli: Run the cli test suites"]);
}

#[test]
fn test_file_channel_appends_each_message() {
    let tmp = tempdir().expect("tempdir");
    let path = tmp.path().join("out").join("comment.md");
    let channel = FileChannel::new(&path);

    channel.deliver(&note("first")).expect("first");
    channel.deliver(&note("second")).expect("second");
    assert_eq!(fs::read_to_string(&path).unwrap(), "first\nsecond\n");
}

#[test]
fn test_dispatcher_from_config_builds_configured_channels() {
    let tmp = tempdir().expect("tempdir");
    let mut config = WardenConfig::with_defaults(tmp.path());
    assert_eq!(Dispatcher::from_config(&config).channel_count(), 0);

    config.notify.file = Some(PathBuf::from(".ciwarden/comment.md"));
    let dispatcher = Dispatcher::from_config(&config);
    assert_eq!(dispatcher.channel_count(), 1);

    let report = dispatcher.dispatch(&note("hello"));
    assert!(report.all_delivered());
    assert_eq!(
        fs::read_to_string(tmp.path().join(".ciwarden/comment.md")).unwrap(),
        "hello\n"
    );
}

#[test]
fn test_no_channels_delivers_nothing() {
    let report = Dispatcher::new().dispatch(&note("quiet"));
    assert!(report.delivered.is_empty());
    assert!(report.all_delivered());
}
