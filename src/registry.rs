//! A bounded table of open sessions addressed by small integer handles,
//! for embedders that hand out numeric handles instead of owned values.

use std::path::Path;

use crate::commit::CommitOutcome;
use crate::session::{Info, Mode, Session, SessionConfig};
use crate::{Error, Result};

const DEFAULT_MAX_HANDLES: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub max_handles: usize,
    pub session: SessionConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_handles: DEFAULT_MAX_HANDLES,
            session: SessionConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(pub usize);

#[derive(Debug)]
pub struct HandleRegistry {
    slots: Vec<Option<Session>>,
    config: RegistryConfig,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl HandleRegistry {
    pub fn new(config: RegistryConfig) -> Self {
        let mut slots = Vec::with_capacity(config.max_handles);
        slots.resize_with(config.max_handles, || None);
        Self { slots, config }
    }

    /// Open a session in the lowest free slot.
    pub fn open(&mut self, path: impl AsRef<Path>, mode: Mode) -> Result<HandleId> {
        let slot = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(Error::RegistryFull(self.config.max_handles))?;
        let session = Session::open_with(path, mode, self.config.session.clone())?;
        self.slots[slot] = Some(session);
        Ok(HandleId(slot))
    }

    pub fn get(&self, id: HandleId) -> Result<&Session> {
        self.slots
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(Error::UnknownHandle(id.0))
    }

    pub fn get_mut(&mut self, id: HandleId) -> Result<&mut Session> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(Error::UnknownHandle(id.0))
    }

    pub fn find(&mut self, id: HandleId, key: &[u8]) -> Result<bool> {
        Ok(self.get_mut(id)?.find(key))
    }

    pub fn fetch(&mut self, id: HandleId) -> Result<Vec<u8>> {
        self.get_mut(id)?.fetch()
    }

    pub fn add(
        &mut self,
        id: HandleId,
        key: &[u8],
        value: &[u8],
        metadata: Option<&[u8]>,
    ) -> Result<bool> {
        self.get_mut(id)?.add(key, value, metadata)
    }

    pub fn info(&self, id: HandleId) -> Result<Info> {
        Ok(self.get(id)?.info())
    }

    /// Close a session and free its slot; the slot is freed even when the
    /// commit fails.
    pub fn close(&mut self, id: HandleId, force_mode: Option<Mode>) -> Result<CommitOutcome> {
        let session = self
            .slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(Error::UnknownHandle(id.0))?;
        session.close_with(force_mode)
    }

    pub fn open_handles(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Close every open session without committing. Uncommitted additions
    /// are the price of not closing explicitly.
    pub fn shutdown(&mut self) -> Vec<(HandleId, Result<CommitOutcome>)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, session)| {
                session
                    .take()
                    .map(|session| (HandleId(slot), session.close_with(Some(Mode::Read))))
            })
            .collect()
    }
}

impl Drop for HandleRegistry {
    fn drop(&mut self) {
        for (id, outcome) in self.shutdown() {
            if let Err(err) = outcome {
                log::warn!("closing handle {} on shutdown failed: {err}", id.0);
            }
        }
    }
}
