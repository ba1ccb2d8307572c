//! The thread-wide execution event interception: instrumented code emits [Event]s through [call()], [line()],
//! [ret()] & [raise()]; whatever [TraceHook] is installed in the current thread gets to see them.
//!
//! The hook slot is only touched through an [InstrumentationHandle], which remembers the previously installed hook
//! and gives it back when released -- explicitly or by being dropped, as it happens while a panic unwinds.
//!
//! While installed, a hook sees every event emitted on its thread -- not only the ones of the monitored function
//! and its callees. Events emitted on other threads are never seen.

use super::frame::Frame;
use std::cell::RefCell;


/// Low level execution events
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Event {
    /// a function was entered
    Call,
    /// a new statement is about to run
    Line,
    /// a function is about to return
    Return,
    /// a function is about to fail
    Exception,
}

/// Receives the execution events of the thread it is installed in
pub trait TraceHook {
    fn on_event(&mut self, frame: &Frame<'_>, event: Event);
}

thread_local! {
    static TRACE_HOOK: RefCell<Option<Box<dyn TraceHook>>> = const { RefCell::new(None) };
}

/// Emits `event` to the installed hook, if any.\
/// Events emitted while the hook is handling another one -- from within the hook itself -- are not delivered.
pub fn emit(event: Event, frame: &Frame<'_>) {
    let Some(mut hook) = TRACE_HOOK.with(|slot| slot.borrow_mut().take()) else {
        return
    };
    hook.on_event(frame, event);
    TRACE_HOOK.with(|slot| {
        let mut slot = slot.borrow_mut();
        // someone else may have been installed meanwhile
        if slot.is_none() {
            *slot = Some(hook);
        }
    });
}

/// Emits [Event::Call] -- to be used as the first statement of an instrumented function
pub fn call(frame: &Frame<'_>) {
    emit(Event::Call, frame)
}

/// Emits [Event::Line]
pub fn line(frame: &Frame<'_>) {
    emit(Event::Line, frame)
}

/// Emits [Event::Return] -- to be used right before an instrumented function returns
pub fn ret(frame: &Frame<'_>) {
    emit(Event::Return, frame)
}

/// Emits [Event::Exception] -- to be used right before an instrumented function fails
pub fn raise(frame: &Frame<'_>) {
    emit(Event::Exception, frame)
}

/// Tells if a hook is installed in the current thread
pub fn is_armed() -> bool {
    TRACE_HOOK.with(|slot| slot.borrow().is_some())
}

fn replace_hook(hook: Option<Box<dyn TraceHook>>) -> Option<Box<dyn TraceHook>> {
    TRACE_HOOK.with(|slot| slot.replace(hook))
}


/// Owned installation of a [TraceHook] in the current thread: the previously installed hook is saved
/// on [Self::acquire()] and restored on [Self::release()] or when this handle is dropped.
pub struct InstrumentationHandle {
    previous: Option<Option<Box<dyn TraceHook>>>,
}

impl InstrumentationHandle {

    pub fn acquire(hook: Box<dyn TraceHook>) -> Self {
        let previous = replace_hook(Some(hook));
        log::debug!("trace hook installed{}", if previous.is_some() { " -- saving the previous one" } else { "" });
        Self { previous: Some(previous) }
    }

    /// Uninstalls our hook, reinstalling whatever was there before [Self::acquire()]
    pub fn release(mut self) {
        self.restore()
    }

    fn restore(&mut self) {
        if let Some(previous) = self.previous.take() {
            let had_previous = previous.is_some();
            // our hook is dropped here, along with anything it holds
            drop(replace_hook(previous));
            log::debug!("trace hook uninstalled{}", if had_previous { " -- the previous one is back" } else { "" });
        }
    }
}

impl Drop for InstrumentationHandle {
    fn drop(&mut self) {
        self.restore()
    }
}


#[cfg(any(test, feature="dox"))]
mod tests {

    //! Unit tests for [instrumentation](super) module

    use super::*;
    use crate::sampling::{CodeId, Globals};
    use std::{cell::Cell, rc::Rc};


    const TRACED: CodeId = CodeId::new("traced");

    /// counts the events it receives -- and emits one of its own, which must not come back
    struct Counter {
        events: Rc<Cell<u32>>,
    }
    impl TraceHook for Counter {
        fn on_event(&mut self, frame: &Frame<'_>, _event: Event) {
            self.events.set(self.events.get() + 1);
            line(frame);
        }
    }

    #[test]
    fn events_reach_the_installed_hook() {
        let globals = Globals::new();
        let events = Rc::new(Cell::new(0));
        line(&Frame::new(TRACED, &globals));
        let handle = InstrumentationHandle::acquire(Box::new(Counter { events: Rc::clone(&events) }));
        assert!(is_armed());
        call(&Frame::new(TRACED, &globals));
        line(&Frame::new(TRACED, &globals));
        ret(&Frame::new(TRACED, &globals));
        handle.release();
        assert!(!is_armed());
        line(&Frame::new(TRACED, &globals));
        assert_eq!(events.get(), 3, "only the events emitted while installed must be seen -- and not the hook's own");
    }

    #[test]
    fn previous_hook_is_restored() {
        let globals = Globals::new();
        let outer_events = Rc::new(Cell::new(0));
        let inner_events = Rc::new(Cell::new(0));
        let outer = InstrumentationHandle::acquire(Box::new(Counter { events: Rc::clone(&outer_events) }));
        {
            let _inner = InstrumentationHandle::acquire(Box::new(Counter { events: Rc::clone(&inner_events) }));
            line(&Frame::new(TRACED, &globals));
        }
        line(&Frame::new(TRACED, &globals));
        outer.release();
        assert_eq!((outer_events.get(), inner_events.get()), (1, 1), "dropping the inner handle must bring the outer hook back");
        assert!(!is_armed());
    }

    #[test]
    fn hook_is_restored_when_unwinding() {
        let globals = Globals::new();
        let events = Rc::new(Cell::new(0));
        let outer = InstrumentationHandle::acquire(Box::new(Counter { events: Rc::clone(&events) }));
        let result = std::panic::catch_unwind(|| {
            let _inner = InstrumentationHandle::acquire(Box::new(Counter { events: Rc::new(Cell::new(0)) }));
            panic!("monitored code failed");
        });
        assert!(result.is_err());
        line(&Frame::new(TRACED, &globals));
        outer.release();
        assert_eq!(events.get(), 1, "the outer hook must be back after the panic");
    }
}
