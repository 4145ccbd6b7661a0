//! In-process doubles for the device and the clock.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use h1ctl_transport::TransportError;
use serde_json::{Map, Value};

use crate::clock::Clock;
use crate::command::Response;
use crate::correlator::FrameSink;
use crate::mailbox::Mailbox;

pub(crate) fn reply(command: &str, status: i64) -> Response {
    Response {
        command: command.to_string(),
        status,
        extra: Map::new(),
    }
}

/// Something observable that happened during a test run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Event {
    Sleep(Duration),
    Sent(String),
}

type EventLog = Rc<RefCell<Vec<Event>>>;
type Hook = Box<dyn FnMut(Duration)>;

/// Records requested sleeps instead of blocking.
pub(crate) struct FakeClock {
    log: EventLog,
    hooks: RefCell<Vec<Hook>>,
}

impl FakeClock {
    pub(crate) fn new() -> Self {
        Self {
            log: Rc::new(RefCell::new(Vec::new())),
            hooks: RefCell::new(Vec::new()),
        }
    }

    /// Run `hook` after every recorded sleep.
    pub(crate) fn on_sleep(&self, hook: impl FnMut(Duration) + 'static) {
        self.hooks.borrow_mut().push(Box::new(hook));
    }

    pub(crate) fn sleeps(&self) -> Vec<Duration> {
        self.log
            .borrow()
            .iter()
            .filter_map(|event| match event {
                Event::Sleep(d) => Some(*d),
                Event::Sent(_) => None,
            })
            .collect()
    }

    pub(crate) fn events(&self) -> Vec<Event> {
        self.log.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn sleep(&self, duration: Duration) {
        self.log.borrow_mut().push(Event::Sleep(duration));
        for hook in self.hooks.borrow_mut().iter_mut() {
            hook(duration);
        }
    }
}

struct Rule {
    command: String,
    delay: u32,
    reply: Response,
    once: bool,
}

#[derive(Default)]
struct DeviceState {
    rules: Vec<Rule>,
    scheduled: Vec<(u32, Response)>,
    frames: Vec<Vec<u8>>,
    drop_on: Option<String>,
    fail_sends: bool,
    log: Option<EventLog>,
}

/// A device that answers sent frames from a script.
///
/// Replies with a delay are published after that many clock sleeps, so the
/// device must be attached to the clock the correlator uses.
pub(crate) struct ScriptedDevice {
    mailbox: Arc<Mailbox>,
    state: Rc<RefCell<DeviceState>>,
}

impl ScriptedDevice {
    pub(crate) fn new() -> Self {
        Self {
            mailbox: Arc::new(Mailbox::new()),
            state: Rc::new(RefCell::new(DeviceState::default())),
        }
    }

    fn rule(self, command: &str, delay: u32, reply: Response, once: bool) -> Self {
        self.state.borrow_mut().rules.push(Rule {
            command: command.to_string(),
            delay,
            reply,
            once,
        });
        self
    }

    /// Answer every `command` with `reply` straight away.
    pub(crate) fn reply_to(self, command: &str, reply: Response) -> Self {
        self.rule(command, 0, reply, false)
    }

    /// Answer every `command` with `reply` after `sleeps` clock sleeps.
    pub(crate) fn reply_after(self, command: &str, sleeps: u32, reply: Response) -> Self {
        self.rule(command, sleeps, reply, false)
    }

    /// Answer the next `command` only; later rules for it apply afterwards.
    pub(crate) fn reply_once(self, command: &str, reply: Response) -> Self {
        self.rule(command, 0, reply, true)
    }

    /// Close the inbound side as soon as `command` is sent.
    pub(crate) fn drop_on(self, command: &str) -> Self {
        self.state.borrow_mut().drop_on = Some(command.to_string());
        self
    }

    /// Fail every send as if the socket were gone.
    pub(crate) fn fail_sends(self) -> Self {
        self.state.borrow_mut().fail_sends = true;
        self
    }

    pub(crate) fn mailbox(&self) -> Arc<Mailbox> {
        Arc::clone(&self.mailbox)
    }

    /// Share the clock's event log and deliver delayed replies on its sleeps.
    pub(crate) fn attach(&self, clock: &FakeClock) {
        self.state.borrow_mut().log = Some(Rc::clone(&clock.log));
        let state = Rc::clone(&self.state);
        let mailbox = Arc::clone(&self.mailbox);
        clock.on_sleep(move |_| {
            let mut state = state.borrow_mut();
            let mut due = Vec::new();
            state.scheduled.retain_mut(|(remaining, reply)| {
                *remaining -= 1;
                if *remaining == 0 {
                    due.push(reply.clone());
                    false
                } else {
                    true
                }
            });
            for reply in due {
                mailbox.publish(reply);
            }
        });
    }

    pub(crate) fn frames(&self) -> Vec<Vec<u8>> {
        self.state.borrow().frames.clone()
    }

    pub(crate) fn sent(&self) -> Vec<Value> {
        self.state
            .borrow()
            .frames
            .iter()
            .filter_map(|frame| serde_json::from_slice(&frame[8..]).ok())
            .collect()
    }

    pub(crate) fn sent_names(&self) -> Vec<String> {
        self.sent()
            .iter()
            .filter_map(|value| value["command"].as_str().map(str::to_string))
            .collect()
    }
}

impl FrameSink for ScriptedDevice {
    fn send_frame(&mut self, frame: &[u8]) -> h1ctl_transport::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.fail_sends {
            return Err(TransportError::NotConnected);
        }
        state.frames.push(frame.to_vec());

        let value: Value = serde_json::from_slice(&frame[8..]).unwrap_or(Value::Null);
        let name = value["command"].as_str().unwrap_or_default().to_string();
        if let Some(log) = &state.log {
            log.borrow_mut().push(Event::Sent(name.clone()));
        }

        if state.drop_on.as_deref() == Some(name.as_str()) {
            self.mailbox.close();
            return Ok(());
        }

        let Some(index) = state.rules.iter().position(|rule| rule.command == name) else {
            return Ok(());
        };
        let (delay, reply) = if state.rules[index].once {
            let rule = state.rules.remove(index);
            (rule.delay, rule.reply)
        } else {
            (state.rules[index].delay, state.rules[index].reply.clone())
        };
        if delay == 0 {
            self.mailbox.publish(reply);
        } else {
            state.scheduled.push((delay, reply));
        }
        Ok(())
    }
}
