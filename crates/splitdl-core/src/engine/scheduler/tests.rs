use super::*;
use crate::engine::SleepCommand;

/// Shared state for scheduler tests: an execution log plus a stop handle.
#[derive(Default)]
struct Log {
    entries: Vec<&'static str>,
    stop: StopFlag,
}

/// Finishes after `runs` executions, logging each one.
struct Counted {
    label: &'static str,
    runs: u32,
}

impl Command<Log> for Counted {
    fn execute(&mut self, state: &mut Log, tick: &mut Tick<Log>) -> EngineResult<bool> {
        state.entries.push(self.label);
        tick.mark_busy();
        self.runs -= 1;
        Ok(self.runs == 0)
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

/// Spawns a child on its only execution.
struct Parent;

impl Command<Log> for Parent {
    fn execute(&mut self, state: &mut Log, tick: &mut Tick<Log>) -> EngineResult<bool> {
        state.entries.push("parent");
        tick.spawn(Box::new(Counted { label: "child", runs: 1 }));
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "parent"
    }
}

/// Never finishes.
struct Forever;

impl Command<Log> for Forever {
    fn execute(&mut self, state: &mut Log, _tick: &mut Tick<Log>) -> EngineResult<bool> {
        state.entries.push("forever");
        Ok(false)
    }

    fn name(&self) -> &'static str {
        "forever"
    }
}

struct Failing(fn() -> EngineError);

impl Command<Log> for Failing {
    fn execute(&mut self, state: &mut Log, _tick: &mut Tick<Log>) -> EngineResult<bool> {
        state.entries.push("failing");
        Err((self.0)())
    }

    fn name(&self) -> &'static str {
        "failing"
    }
}

struct Halter;

impl Command<Log> for Halter {
    fn execute(&mut self, state: &mut Log, _tick: &mut Tick<Log>) -> EngineResult<bool> {
        state.entries.push("halter");
        state.stop.request_stop();
        Ok(false)
    }

    fn name(&self) -> &'static str {
        "halter"
    }
}

fn scheduler(log: &Log) -> Scheduler<Log> {
    Scheduler::new(log.stop.clone()).with_idle_wait(Duration::ZERO)
}

#[test]
fn fifo_order_and_requeue_until_finished() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    s.push(Box::new(Counted { label: "a", runs: 2 }));
    s.push(Box::new(Counted { label: "b", runs: 1 }));
    assert_eq!(s.run(&mut log).unwrap(), RunOutcome::Drained);
    assert_eq!(log.entries, vec!["a", "b", "a"]);
    assert_eq!(s.stats().finished, 2);
    assert_eq!(s.stats().passes, 2);
}

#[test]
fn spawned_commands_run_from_next_pass() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    s.push(Box::new(Parent));
    s.push(Box::new(Counted { label: "sibling", runs: 2 }));
    let mut fatal = None;
    s.run_pass(&mut log, &mut fatal);
    assert_eq!(log.entries, vec!["parent", "sibling"]);
    assert_eq!(
        s.command_states(),
        vec![("sibling", CommandState::Active), ("child", CommandState::Pending)]
    );
    s.run_pass(&mut log, &mut fatal);
    assert_eq!(log.entries, vec!["parent", "sibling", "sibling", "child"]);
    assert!(s.is_empty());
}

#[test]
fn self_requeuing_command_runs_once_per_pass() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    s.push(Box::new(Forever));
    let mut fatal = None;
    s.run_pass(&mut log, &mut fatal);
    assert_eq!(log.entries, vec!["forever"]);
    assert_eq!(s.len(), 1);
}

#[test]
fn sleeping_command_is_requeued_without_running() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    let next = Box::new(Counted { label: "woke", runs: 1 });
    s.push(Box::new(SleepCommand::new(Duration::from_secs(3600), next)));
    let mut fatal = None;
    s.run_pass(&mut log, &mut fatal);
    assert!(log.entries.is_empty());
    assert!(matches!(
        s.command_states()[0],
        ("sleep", CommandState::Sleeping(_))
    ));
}

#[test]
fn due_sleep_hands_off_to_wrapped_command() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    let next = Box::new(Counted { label: "woke", runs: 1 });
    s.push(Box::new(SleepCommand::new(Duration::ZERO, next)));
    assert_eq!(s.run(&mut log).unwrap(), RunOutcome::Drained);
    assert_eq!(log.entries, vec!["woke"]);
    assert_eq!(s.stats().passes, 2);
}

#[test]
fn stop_flag_is_checked_once_per_pass() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    s.push(Box::new(Halter));
    s.push(Box::new(Forever));
    assert_eq!(s.run(&mut log).unwrap(), RunOutcome::Stopped);
    // The pass that raised the flag still completes; nothing runs afterwards.
    assert_eq!(log.entries, vec!["halter", "forever"]);
    assert_eq!(s.len(), 2);
}

#[test]
fn non_fatal_error_drops_only_that_command() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    s.push(Box::new(Failing(|| EngineError::Transient("reset".into()))));
    s.push(Box::new(Counted { label: "ok", runs: 2 }));
    assert_eq!(s.run(&mut log).unwrap(), RunOutcome::Drained);
    assert_eq!(log.entries, vec!["failing", "ok", "ok"]);
    assert_eq!(s.stats().failed, 1);
}

#[test]
fn fatal_error_stops_engine_and_propagates() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    s.push(Box::new(Failing(|| {
        EngineError::io(
            "write",
            std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        )
    })));
    s.push(Box::new(Forever));
    let err = s.run(&mut log).unwrap_err();
    assert!(matches!(err, EngineError::Io { .. }));
    assert!(log.stop.is_stop_requested());
    assert_eq!(log.entries, vec!["failing", "forever"]);
    assert_eq!(s.len(), 1);
}

/// Asks the scheduler to wake sleepers on its only execution.
struct Waker;

impl Command<Log> for Waker {
    fn execute(&mut self, state: &mut Log, tick: &mut Tick<Log>) -> EngineResult<bool> {
        state.entries.push("waker");
        tick.wake_sleepers();
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "waker"
    }
}

#[test]
fn wake_request_runs_sleepers_early_once() {
    let mut log = Log::default();
    let mut s = scheduler(&log);
    let next = Box::new(Counted { label: "woke", runs: 1 });
    s.push(Box::new(SleepCommand::new(Duration::from_secs(3600), next)));
    s.push(Box::new(Waker));
    s.push(Box::new(SleepCommand::new(
        Duration::from_secs(3600),
        Box::new(Counted { label: "late", runs: 1 }),
    )));
    let mut fatal = None;
    s.run_pass(&mut log, &mut fatal);
    assert_eq!(log.entries, vec!["waker"]);
    // Both sleeps fire in the next pass; their children run in the one after.
    s.run_pass(&mut log, &mut fatal);
    assert_eq!(s.command_states().len(), 2);
    assert_eq!(s.run(&mut log).unwrap(), RunOutcome::Drained);
    assert_eq!(log.entries, vec!["waker", "woke", "late"]);
}
