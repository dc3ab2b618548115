// Facades: suspend/release for known subjects, husk/absorb for unknown ones
//
// Worlds are keyed by explicit tickets handed out at creation time. Releasing
// or absorbing requires the ticket back, so no identity-based registry is
// involved, and a ticket is consumed by use.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::deferred::{CapabilityView, Deferred};
use crate::error::{RuntimeError, RuntimeResult};
use crate::record::Recorder;
use crate::values::Value;

/// Identifies one deferred world within the facade that created it.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct WorldTicket(u64);

struct World {
    root: Deferred,
    recorder: Rc<Recorder>,
}

#[derive(Default)]
struct WorldRegistry {
    worlds: HashMap<u64, World>,
    next_ticket: u64,
}

impl WorldRegistry {
    fn issue(&mut self, world: World) -> WorldTicket {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        self.worlds.insert(ticket, world);
        WorldTicket(ticket)
    }

    fn claim(&mut self, ticket: WorldTicket) -> RuntimeResult<(u64, World)> {
        let world = self
            .worlds
            .remove(&ticket.0)
            .ok_or(RuntimeError::UnknownWorld(ticket.0))?;
        Ok((ticket.0, world))
    }
}

/// Wraps already-existing subjects whose effects must be withheld until
/// release.
#[derive(Default)]
pub struct Stasis {
    registry: WorldRegistry,
}

impl Stasis {
    pub fn new() -> Stasis {
        Stasis::default()
    }

    /// Suspends a known subject: the returned placeholder records every
    /// interaction instead of executing it. The ticket is needed to release
    /// the world later.
    pub fn suspend(&mut self, subject: Value) -> (Value, WorldTicket) {
        let recorder = Recorder::new();
        let root = Deferred::pending(Rc::clone(&recorder), Some(subject));
        let ticket = self.registry.issue(World {
            root: root.clone(),
            recorder,
        });
        log::debug!("suspended world #{}", ticket.0);
        (Value::Deferred(root), ticket)
    }

    /// Releases a suspended world: the root placeholder resolves to its
    /// withheld subject and the ledger replays in capture order before this
    /// call returns.
    pub fn release(&mut self, ticket: WorldTicket) -> RuntimeResult<()> {
        let (id, world) = self.registry.claim(ticket)?;
        let view = CapabilityView::of(&world.root);
        let subject = view.pending_subject().ok_or_else(|| {
            RuntimeError::InternalError("suspended world lost its subject".to_string())
        })?;
        view.resolve(subject)?;
        log::debug!(
            "released world #{}: {} placeholders, {} records",
            id,
            world.recorder.member_count(),
            world.recorder.ledger_len()
        );
        world.recorder.replay()
    }
}

/// Wraps a subject that does not exist yet.
#[derive(Default)]
pub struct Mimic {
    registry: WorldRegistry,
}

impl Mimic {
    pub fn new() -> Mimic {
        Mimic::default()
    }

    /// Creates an empty placeholder for a subject still to come.
    pub fn husk(&mut self) -> (Value, WorldTicket) {
        let recorder = Recorder::new();
        let root = Deferred::pending(Rc::clone(&recorder), None);
        let ticket = self.registry.issue(World {
            root: root.clone(),
            recorder,
        });
        log::debug!("created husk world #{}", ticket.0);
        (Value::Deferred(root), ticket)
    }

    /// Claims a husk's world. The returned binder performs the one-shot
    /// resolution.
    pub fn absorb(&mut self, ticket: WorldTicket) -> RuntimeResult<Binder> {
        let (id, world) = self.registry.claim(ticket)?;
        Ok(Binder { id, world })
    }
}

/// Produced by `Mimic::absorb`; consumed by `resolve`, so a world binds to
/// its subject exactly once.
pub struct Binder {
    id: u64,
    world: World,
}

impl Binder {
    /// Assigns the real subject to the husk and replays the world's ledger
    /// in capture order before returning.
    pub fn resolve(self, subject: Value) -> RuntimeResult<()> {
        CapabilityView::of(&self.world.root).resolve(subject)?;
        log::debug!(
            "absorbed world #{}: {} placeholders, {} records",
            self.id,
            self.world.recorder.member_count(),
            self.world.recorder.ledger_len()
        );
        self.world.recorder.replay()
    }
}

impl fmt::Debug for Binder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder")
            .field("world", &self.id)
            .field("records", &self.world.recorder.ledger_len())
            .finish()
    }
}
