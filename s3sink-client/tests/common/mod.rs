//! Store double for writer tests: a real local store with a call log and
//! switchable faults

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::{Arc, Mutex};
use s3sink_core::*;
use s3sink_engine::{LocalStore, StorageEngine};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open,
    Upload { part: u32, payload: Vec<u8>, ok: bool },
    Finalize { parts: Vec<u32> },
    Abort,
}

#[derive(Debug, Default)]
pub struct Faults {
    pub open: bool,
    /// Number of upcoming part uploads that fail
    pub uploads: u32,
    pub finalize: bool,
    pub abort: bool,
}

pub struct ScriptedStore {
    inner: LocalStore,
    calls: Mutex<Vec<Call>>,
    faults: Mutex<Faults>,
}

impl ScriptedStore {
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn faults(&self) -> std::sync::MutexGuard<'_, Faults> {
        self.faults.lock().unwrap()
    }

    pub fn local(&self) -> &LocalStore {
        &self.inner
    }

    /// Payloads of successful uploads in call order
    pub fn uploaded(&self) -> Vec<(u32, Vec<u8>)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Upload { part, payload, ok: true } => Some((part, payload)),
                _ => None,
            })
            .collect()
    }

    pub fn finalize_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Finalize { .. }))
            .count()
    }

    pub fn abort_calls(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Abort)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn injected(what: &str) -> StoreError {
        StoreError::Transport(format!("injected {} failure", what))
    }
}

#[async_trait]
impl ObjectStore for ScriptedStore {
    async fn open_session(&self, bucket: &BucketName, key: &ObjectKey) -> Result<SessionToken> {
        self.record(Call::Open);
        let fail = self.faults().open;
        if fail {
            return Err(Self::injected("open"));
        }
        self.inner.open_session(bucket, key).await
    }

    async fn upload_part(
        &self,
        session: &UploadSession,
        part_number: PartNumber,
        payload: Bytes,
    ) -> Result<IntegrityTag> {
        let fail = {
            let mut faults = self.faults();
            if faults.uploads > 0 {
                faults.uploads -= 1;
                true
            } else {
                false
            }
        };

        let result = if fail {
            Err(Self::injected("upload"))
        } else {
            self.inner.upload_part(session, part_number, payload.clone()).await
        };

        self.record(Call::Upload {
            part: part_number.get(),
            payload: payload.to_vec(),
            ok: result.is_ok(),
        });
        result
    }

    async fn finalize_session(&self, session: &UploadSession, parts: &[CompletedPart]) -> Result<()> {
        self.record(Call::Finalize {
            parts: parts.iter().map(|p| p.part_number.get()).collect(),
        });
        let fail = self.faults().finalize;
        if fail {
            return Err(StoreError::InvalidPart {
                part_number: 1,
                reason: "injected finalize rejection".to_string(),
            });
        }
        self.inner.finalize_session(session, parts).await
    }

    async fn abort_session(&self, session: &UploadSession) -> Result<()> {
        self.record(Call::Abort);
        let fail = self.faults().abort;
        if fail {
            return Err(Self::injected("abort"));
        }
        self.inner.abort_session(session).await
    }
}

/// In-memory store that accepts everything and records part numbers, for
/// runs too long to push through the engine
#[derive(Default)]
pub struct CountingStore {
    uploads: Mutex<Vec<u32>>,
    finalized: Mutex<Option<usize>>,
    aborts: Mutex<usize>,
}

impl CountingStore {
    pub fn uploads(&self) -> Vec<u32> {
        self.uploads.lock().unwrap().clone()
    }

    /// Part count of the finalize call, if one was made
    pub fn finalized(&self) -> Option<usize> {
        *self.finalized.lock().unwrap()
    }

    pub fn aborts(&self) -> usize {
        *self.aborts.lock().unwrap()
    }
}

#[async_trait]
impl ObjectStore for CountingStore {
    async fn open_session(&self, _bucket: &BucketName, _key: &ObjectKey) -> Result<SessionToken> {
        Ok(SessionToken::new("counting"))
    }

    async fn upload_part(
        &self,
        _session: &UploadSession,
        part_number: PartNumber,
        _payload: Bytes,
    ) -> Result<IntegrityTag> {
        self.uploads.lock().unwrap().push(part_number.get());
        Ok(IntegrityTag::new(format!("tag-{}", part_number)))
    }

    async fn finalize_session(&self, _session: &UploadSession, parts: &[CompletedPart]) -> Result<()> {
        *self.finalized.lock().unwrap() = Some(parts.len());
        Ok(())
    }

    async fn abort_session(&self, _session: &UploadSession) -> Result<()> {
        *self.aborts.lock().unwrap() += 1;
        Ok(())
    }
}

/// A scripted store over a fresh engine with one bucket, `logs`
pub fn setup(min_part_size: u64) -> (Arc<ScriptedStore>, tempfile::TempDir, BucketName) {
    let (engine, temp) = StorageEngine::temp().unwrap();
    let engine = engine.with_min_part_size(min_part_size);
    let bucket = BucketName::new("logs").unwrap();
    engine.create_bucket(&bucket).unwrap();

    let store = Arc::new(ScriptedStore {
        inner: LocalStore::new(engine),
        calls: Mutex::new(Vec::new()),
        faults: Mutex::new(Faults::default()),
    });
    (store, temp, bucket)
}

pub fn key(name: &str) -> ObjectKey {
    ObjectKey::new(name).unwrap()
}
