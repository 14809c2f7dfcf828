//! Integration tests for the chat-to-speech pipeline
//!
//! These tests drive real sessions over in-memory transports through the
//! orchestrator and observe what reaches the voice engine.

use crossbeam_channel::Sender;
use murmur::integration::{MurmurConfig, Orchestrator, OrchestratorHandle};
use murmur::messages::{MessageKind, SystemNotice};
use murmur::session::ChatSession;
use murmur::speech::{Utterance, VoiceEngine, VoiceEvent};
use murmur::transport::{ChannelConnector, RemoteEnd};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(2);

/// What the voice engine saw, shared with the test
#[derive(Clone, Default)]
struct VoiceLog {
    spoken: Arc<Mutex<Vec<Utterance>>>,
    cancels: Arc<AtomicUsize>,
    events: Arc<Mutex<Option<Sender<VoiceEvent>>>>,
}

impl VoiceLog {
    fn texts(&self) -> Vec<String> {
        self.spoken.lock().iter().map(|u| u.text.clone()).collect()
    }

    fn finish_last(&self) {
        let id = self.spoken.lock().last().map(|u| u.id).unwrap();
        let events = self.events.lock();
        events
            .as_ref()
            .unwrap()
            .send(VoiceEvent::Finished { utterance_id: id })
            .unwrap();
    }

    fn wait_for_count(&self, count: usize) -> Vec<String> {
        assert!(
            wait_until(|| self.spoken.lock().len() >= count),
            "expected {} utterances, got {:?}",
            count,
            self.texts()
        );
        self.texts()
    }
}

/// Engine that keeps speaking until the test finishes the utterance
struct ManualVoice {
    log: VoiceLog,
}

impl VoiceEngine for ManualVoice {
    fn speak(&mut self, utterance: &Utterance) -> murmur::Result<()> {
        self.log.spoken.lock().push(utterance.clone());
        Ok(())
    }

    fn cancel(&mut self) {
        self.log.cancels.fetch_add(1, Ordering::SeqCst);
        // A cancelled utterance still reports completion
        if self.log.spoken.lock().last().is_some() {
            self.log.finish_last();
        }
    }
}

struct Pipeline {
    handle: OrchestratorHandle,
    worker: JoinHandle<()>,
    connector: ChannelConnector,
    voice: VoiceLog,
}

impl Pipeline {
    fn start() -> Self {
        let voice = VoiceLog::default();
        let log = voice.clone();
        let (orchestrator, handle) = Orchestrator::new(&MurmurConfig::default(), move |events| {
            *log.events.lock() = Some(events);
            ManualVoice { log }
        })
        .unwrap();

        Self {
            handle,
            worker: orchestrator.start().unwrap(),
            connector: ChannelConnector::new(),
            voice,
        }
    }

    /// Register a fresh session under `name` and log it in
    fn connect(&self, name: &str) -> (ChatSession, RemoteEnd) {
        let session = ChatSession::new(self.connector.clone());
        self.handle.register(name, session.clone()).unwrap();
        assert!(self.handle.has_source(name).unwrap());

        session.log_in("justinfan123", "SCHMOOPIIE").unwrap();
        let remote = self.connector.next_remote(WAIT).unwrap();
        (session, remote)
    }

    fn stop(self) {
        self.handle.shutdown().unwrap();
        self.worker.join().unwrap();
    }
}

fn chat(user: &str, text: &str) -> String {
    format!(":{0}!{0}@{0}.tmi.twitch.tv PRIVMSG #shroud :{1}", user, text)
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_messages_play_one_at_a_time_in_order() {
    let pipeline = Pipeline::start();
    let (_session, remote) = pipeline.connect("twitch");

    for text in ["A", "B", "C"] {
        remote.push_line(chat("viewer", text));
    }

    assert_eq!(pipeline.voice.wait_for_count(1), vec!["A"]);
    assert!(wait_until(|| pipeline.handle.status().unwrap().queued == 2));
    assert_eq!(pipeline.voice.texts(), vec!["A"]);

    pipeline.voice.finish_last();
    assert_eq!(pipeline.voice.wait_for_count(2), vec!["A", "B"]);

    pipeline.voice.finish_last();
    assert_eq!(pipeline.voice.wait_for_count(3), vec!["A", "B", "C"]);

    let spoken = pipeline.voice.spoken.lock().clone();
    assert!(spoken.iter().all(|u| u.source_name == "twitch" && u.speaker == "viewer"));

    pipeline.voice.finish_last();
    assert!(wait_until(|| pipeline.handle.status().unwrap().is_idle()));
    pipeline.stop();
}

#[test]
fn test_cancel_skips_to_next_message() {
    let pipeline = Pipeline::start();
    let (_session, remote) = pipeline.connect("twitch");

    remote.push_line(chat("viewer", "long story"));
    remote.push_line(chat("viewer", "next"));
    pipeline.voice.wait_for_count(1);
    assert!(wait_until(|| pipeline.handle.status().unwrap().queued == 1));

    pipeline.handle.cancel().unwrap();
    assert_eq!(pipeline.voice.wait_for_count(2), vec!["long story", "next"]);
    assert_eq!(pipeline.voice.cancels.load(Ordering::SeqCst), 1);
    pipeline.stop();
}

#[test]
fn test_system_messages_are_routed_but_not_spoken() {
    let pipeline = Pipeline::start();
    let tagged = pipeline.handle.subscribe().unwrap();
    let (_session, remote) = pipeline.connect("twitch");

    remote.push_line(":tmi.twitch.tv 001 justinfan123 :Welcome, GLHF!");
    remote.push_line(":justinfan123!justinfan123@justinfan123.tmi.twitch.tv JOIN #shroud");
    remote.push_line(chat("viewer", "hi"));

    let first = tagged.recv_timeout(WAIT).unwrap();
    assert_eq!(first.source_name, "twitch");
    assert_eq!(first.message.notice(), Some(SystemNotice::LoggedIn));

    let second = tagged.recv_timeout(WAIT).unwrap();
    assert_eq!(second.message.notice(), Some(SystemNotice::ConnectionSuccess));
    assert_eq!(second.message.name(), "shroud");

    let third = tagged.recv_timeout(WAIT).unwrap();
    assert_eq!(third.message.kind(), MessageKind::User);

    assert_eq!(pipeline.voice.wait_for_count(1), vec!["hi"]);
    pipeline.stop();
}

#[test]
fn test_keepalive_is_answered_and_not_spoken() {
    let pipeline = Pipeline::start();
    let (_session, remote) = pipeline.connect("twitch");

    assert_eq!(remote.recv_sent(WAIT).as_deref(), Some("PASS schmoopiie"));
    assert_eq!(remote.recv_sent(WAIT).as_deref(), Some("NICK justinfan123"));

    remote.push_line("PING :tmi.twitch.tv");
    assert_eq!(remote.recv_sent(WAIT).as_deref(), Some("PONG :tmi.twitch.tv"));

    remote.push_line(chat("viewer", "after ping"));
    assert_eq!(pipeline.voice.wait_for_count(1), vec!["after ping"]);
    pipeline.stop();
}

#[test]
fn test_transport_error_is_reported_as_logged_out() {
    let pipeline = Pipeline::start();
    let tagged = pipeline.handle.subscribe().unwrap();
    let (_session, remote) = pipeline.connect("twitch");

    remote.push_error("connection reset");

    let message = tagged.recv_timeout(WAIT).unwrap();
    assert_eq!(message.message.notice(), Some(SystemNotice::LoggedOut));
    assert!(pipeline.handle.has_source("twitch").unwrap());
    assert!(pipeline.voice.texts().is_empty());
    pipeline.stop();
}

#[test]
fn test_reregistering_a_name_replaces_the_source() {
    let pipeline = Pipeline::start();
    let (old_session, old_remote) = pipeline.connect("twitch");
    let (_new_session, new_remote) = pipeline.connect("twitch");

    assert!(old_session.is_completed());
    assert!(old_remote.is_closed());
    assert!(!old_remote.push_line(chat("ghost", "from the old connection")));

    new_remote.push_line(chat("viewer", "from the new connection"));
    assert_eq!(
        pipeline.voice.wait_for_count(1),
        vec!["from the new connection"]
    );
    assert_eq!(pipeline.handle.status().unwrap().sources, vec!["twitch"]);
    pipeline.stop();
}

#[test]
fn test_completed_session_is_removed_and_name_is_reusable() {
    let pipeline = Pipeline::start();
    let (session, _remote) = pipeline.connect("twitch");

    session.complete();
    assert!(wait_until(|| !pipeline.handle.has_source("twitch").unwrap()));

    let (_session, remote) = pipeline.connect("twitch");
    remote.push_line(chat("viewer", "back again"));
    assert_eq!(pipeline.voice.wait_for_count(1), vec!["back again"]);
    pipeline.stop();
}

#[test]
fn test_messages_from_two_sources_are_merged() {
    let pipeline = Pipeline::start();
    let (_first, first_remote) = pipeline.connect("first");
    let (_second, second_remote) = pipeline.connect("second");

    first_remote.push_line(chat("a", "one"));
    pipeline.voice.wait_for_count(1);
    second_remote.push_line(chat("b", "two"));
    assert!(wait_until(|| pipeline.handle.status().unwrap().queued == 1));

    pipeline.voice.finish_last();
    pipeline.voice.wait_for_count(2);

    let spoken = pipeline.voice.spoken.lock().clone();
    assert_eq!(spoken[0].source_name, "first");
    assert_eq!(spoken[1].source_name, "second");
    assert_eq!(spoken[1].text, "two");
    pipeline.stop();
}

#[test]
fn test_settings_apply_to_next_utterance() {
    let pipeline = Pipeline::start();
    let (_session, remote) = pipeline.connect("twitch");

    pipeline.handle.set_volume(0.5).unwrap();
    pipeline.handle.set_pitch(1.0).unwrap();
    // Status replies come after earlier commands are applied
    pipeline.handle.status().unwrap();

    remote.push_line(chat("viewer", "tuned"));
    pipeline.voice.wait_for_count(1);
    let spoken = pipeline.voice.spoken.lock()[0].clone();
    assert_eq!(spoken.volume, 0.5);
    assert_eq!(spoken.pitch, 2.0);

    pipeline.handle.reset_settings().unwrap();
    pipeline.handle.status().unwrap();
    pipeline.voice.finish_last();
    remote.push_line(chat("viewer", "default"));
    pipeline.voice.wait_for_count(2);
    let spoken = pipeline.voice.spoken.lock()[1].clone();
    assert_eq!(spoken.volume, 1.0);
    assert_eq!(spoken.pitch, 1.0);
    pipeline.stop();
}

#[test]
fn test_shutdown_completes_sources() {
    let pipeline = Pipeline::start();
    let (session, remote) = pipeline.connect("twitch");

    pipeline.stop();
    assert!(session.is_completed());
    assert!(remote.is_closed());
}
