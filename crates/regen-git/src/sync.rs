//! Remote synchronization and the healer.
//!
//! Provenance refs are not fetched by a default `git clone`, so a fresh
//! clone has no merge bases until [`ensure_ref_available`] pulls exactly the
//! ref a target needs. The healer policy: any failure along the way (
//! remote missing, unreachable, authentication, timeout) degrades to
//! [`RefAvailability::Unavailable`] and generation proceeds on local
//! information alone. Network problems never abort a run.

use git2::{Config, Direction, FetchOptions, PushOptions, RemoteCallbacks};
use serde::Serialize;
use std::cell::RefCell;
use std::time::{Duration, Instant};

use crate::store::{ProvenanceStore, gen_ref};

/// Remote access settings.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Remote name to fetch from / push to.
    pub remote: String,
    /// Deadline for a single network operation; expiry is treated the same
    /// as any other fetch failure.
    pub timeout: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        SyncOptions {
            remote: "origin".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// How a target's provenance ref became (or failed to become) available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum RefAvailability {
    /// The ref already existed locally; no network touched.
    Local,
    /// The ref was fetched from the remote just now.
    Fetched,
    /// The ref could not be obtained; generation proceeds without a base.
    Unavailable(String),
}

impl RefAvailability {
    pub fn is_available(&self) -> bool {
        !matches!(self, RefAvailability::Unavailable(_))
    }
}

/// Outcome of a best-effort ref publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "reason")]
pub enum PushOutcome {
    Pushed,
    Skipped(String),
}

/// A target's provenance availability relative to the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Never generated anywhere this repository can see.
    Absent,
    /// Generated here; the remote has nothing (or is unreachable).
    LocalOnly,
    /// The local ref matches or derives from the pushed remote ref.
    Synced,
    /// The remote has advanced past the local ref (another machine
    /// generated since). Reconciling this is out of scope: ref updates are
    /// last-write-wins, exactly as a fast-forward push would enforce.
    Stale,
}

/// Make a target's provenance ref available locally, fetching it from the
/// remote if needed.
///
/// At most one fetch is attempted, scoped to exactly this ref. This is the
/// healer: every failure mode collapses into `Unavailable(reason)` so the
/// caller can log one warning and continue with a no-base merge.
pub fn ensure_ref_available(
    store: &ProvenanceStore,
    target_id: &str,
    opts: &SyncOptions,
) -> RefAvailability {
    match store.ref_tip(target_id) {
        Ok(Some(_)) => return RefAvailability::Local,
        Ok(None) => {}
        Err(err) => {
            return RefAvailability::Unavailable(format!("local ref lookup failed: {err}"));
        }
    }

    let refname = gen_ref(target_id);
    let mut remote = match store.repo().find_remote(&opts.remote) {
        Ok(remote) => remote,
        Err(_) => {
            return RefAvailability::Unavailable(format!(
                "remote '{}' is not configured",
                opts.remote
            ));
        }
    };

    let refspec = format!("+{refname}:{refname}");
    let mut fetch_opts = FetchOptions::new();
    fetch_opts.remote_callbacks(callbacks_with_deadline(
        store.repo().config().ok(),
        Instant::now() + opts.timeout,
    ));

    match remote.fetch(&[refspec.as_str()], Some(&mut fetch_opts), None) {
        Ok(()) => match store.ref_tip(target_id) {
            Ok(Some(_)) => RefAvailability::Fetched,
            _ => RefAvailability::Unavailable(format!(
                "remote '{}' does not have {refname}",
                opts.remote
            )),
        },
        Err(err) => RefAvailability::Unavailable(format!("fetch failed: {err}")),
    }
}

/// Best-effort push of a target's ref to the remote.
///
/// Failure never fails the generation that produced the ref; the local
/// ref stays authoritative for this machine and can be pushed through the
/// operator's normal git workflow later.
pub fn publish_ref(
    store: &ProvenanceStore,
    target_id: &str,
    opts: &SyncOptions,
) -> PushOutcome {
    let refname = gen_ref(target_id);
    match store.ref_tip(target_id) {
        Ok(Some(_)) => {}
        _ => return PushOutcome::Skipped(format!("no local ref {refname} to publish")),
    }

    let mut remote = match store.repo().find_remote(&opts.remote) {
        Ok(remote) => remote,
        Err(_) => {
            return PushOutcome::Skipped(format!("remote '{}' is not configured", opts.remote));
        }
    };

    // Fast-forward refspec (no leading '+'): the remote rejects history
    // rewrites instead of us ever forcing one.
    let refspec = format!("{refname}:{refname}");
    let rejection: RefCell<Option<String>> = RefCell::new(None);

    let push_result = {
        let mut callbacks = callbacks_with_deadline(
            store.repo().config().ok(),
            Instant::now() + opts.timeout,
        );
        callbacks.push_update_reference(|_name, status| {
            if let Some(message) = status {
                *rejection.borrow_mut() = Some(message.to_string());
            }
            Ok(())
        });
        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(callbacks);
        remote.push(&[refspec.as_str()], Some(&mut push_opts))
    };

    match push_result {
        Err(err) => PushOutcome::Skipped(format!("push failed: {err}")),
        Ok(()) => match rejection.into_inner() {
            Some(message) => PushOutcome::Skipped(format!("push rejected: {message}")),
            None => PushOutcome::Pushed,
        },
    }
}

/// Probe where a target's provenance sits relative to the remote.
///
/// Best effort: an unreachable remote reads as `LocalOnly`/`Absent` rather
/// than an error, consistent with the healer policy.
pub fn probe_state(store: &ProvenanceStore, target_id: &str, opts: &SyncOptions) -> SyncState {
    let local = store.ref_tip(target_id).unwrap_or(None);
    let remote_tip = advertised_tip(store, &gen_ref(target_id), opts);

    match (local, remote_tip) {
        (None, None) => SyncState::Absent,
        (None, Some(_)) => SyncState::Stale,
        (Some(_), None) => SyncState::LocalOnly,
        (Some(local), Some(remote)) if local == remote => SyncState::Synced,
        (Some(local), Some(remote)) => {
            // Local derives from the pushed ref when the remote tip is an
            // ancestor of ours. An unknown remote commit means the remote
            // advanced past anything we have.
            if store
                .repo()
                .graph_descendant_of(local, remote)
                .unwrap_or(false)
            {
                SyncState::Synced
            } else {
                SyncState::Stale
            }
        }
    }
}

/// The commit the remote currently advertises for `refname`, if the remote
/// is reachable and has it.
fn advertised_tip(store: &ProvenanceStore, refname: &str, opts: &SyncOptions) -> Option<git2::Oid> {
    let mut remote = store.repo().find_remote(&opts.remote).ok()?;
    let callbacks = callbacks_with_deadline(
        store.repo().config().ok(),
        Instant::now() + opts.timeout,
    );
    let connection = remote
        .connect_auth(Direction::Fetch, Some(callbacks), None)
        .ok()?;
    let heads = connection.list().ok()?;
    heads
        .iter()
        .find(|head| head.name() == refname)
        .map(|head| head.oid())
}

/// Credential and cancellation callbacks shared by fetch, push, and probe.
///
/// libgit2 exposes no first-class deadline; returning `false` from the
/// progress callbacks once the deadline passes is the supported way to
/// abort a hung transfer.
fn callbacks_with_deadline<'a>(config: Option<Config>, deadline: Instant) -> RemoteCallbacks<'a> {
    let mut callbacks = RemoteCallbacks::new();
    callbacks.credentials(move |url, username_from_url, allowed| {
        if allowed.is_ssh_key()
            && let Some(user) = username_from_url
        {
            return git2::Cred::ssh_key_from_agent(user);
        }
        if allowed.is_user_pass_plaintext()
            && let Some(ref config) = config
            && let Ok(cred) = git2::Cred::credential_helper(config, url, username_from_url)
        {
            return Ok(cred);
        }
        git2::Cred::default()
    });
    callbacks.transfer_progress(move |_| Instant::now() < deadline);
    callbacks.sideband_progress(move |_| Instant::now() < deadline);
    callbacks
}
