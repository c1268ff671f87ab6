//! Operator promotion requests
//!
//! An operator asks for a peer to be moved up the replication chain by
//! placing a `promote` object in the cluster state. The request is advisory:
//! anything malformed, expired or out of date is ignored.

use chrono::{DateTime, Utc};
use manatee_core::{ClusterState, Host};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Role the promoted peer currently holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromoteRole {
    Sync,
    Async,
}

/// A parsed promotion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromoteRequest {
    pub id: String,
    pub role: PromoteRole,
    pub async_index: Option<usize>,
    pub generation: u64,
    pub expire_time: DateTime<Utc>,
}

/// Why a promotion request was not acted on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PromoteRejection {
    #[error("malformed promotion request: {0}")]
    Malformed(String),

    #[error("cannot promote a peer from role {0:?}")]
    UnsupportedRole(String),

    #[error("promotion request expired at {0}")]
    Expired(DateTime<Utc>),

    #[error("promotion request is for generation {requested}, cluster is at {current}")]
    GenerationMismatch { requested: u64, current: u64 },

    #[error("{id} is not the current sync")]
    NotSync { id: String },

    #[error("{id} is not the async at index {index:?}")]
    NotAtAsyncIndex { id: String, index: Option<usize> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRequest {
    id: String,
    role: String,
    #[serde(default)]
    async_index: Option<usize>,
    generation: u64,
    expire_time: String,
}

impl PromoteRequest {
    pub fn parse(raw: &Value) -> Result<Self, PromoteRejection> {
        let raw = RawRequest::deserialize(raw)
            .map_err(|e| PromoteRejection::Malformed(e.to_string()))?;

        let role = match raw.role.as_str() {
            "sync" => PromoteRole::Sync,
            "async" => PromoteRole::Async,
            _ => return Err(PromoteRejection::UnsupportedRole(raw.role)),
        };

        let expire_time = DateTime::parse_from_rfc3339(&raw.expire_time)
            .map_err(|e| PromoteRejection::Malformed(format!("expireTime: {e}")))?
            .with_timezone(&Utc);

        Ok(Self {
            id: raw.id,
            role,
            async_index: raw.async_index,
            generation: raw.generation,
            expire_time,
        })
    }

    /// Check the request against the topology it is meant for
    pub fn check(&self, state: &ClusterState, now: DateTime<Utc>) -> Result<(), PromoteRejection> {
        if now >= self.expire_time {
            return Err(PromoteRejection::Expired(self.expire_time));
        }

        if self.generation != state.generation {
            return Err(PromoteRejection::GenerationMismatch {
                requested: self.generation,
                current: state.generation,
            });
        }

        match self.role {
            PromoteRole::Sync if state.is_sync(&self.id) => Ok(()),
            PromoteRole::Sync => Err(PromoteRejection::NotSync {
                id: self.id.clone(),
            }),
            PromoteRole::Async => {
                let at_index = self
                    .async_index
                    .and_then(|i| state.asyncs.get(i))
                    .map_or(false, |h| h.id == self.id);
                if at_index {
                    Ok(())
                } else {
                    Err(PromoteRejection::NotAtAsyncIndex {
                        id: self.id.clone(),
                        index: self.async_index,
                    })
                }
            }
        }
    }
}

/// Parse and check the request carried by `state`, if there is one.
pub fn pending_request(
    state: &ClusterState,
    now: DateTime<Utc>,
) -> Option<Result<PromoteRequest, PromoteRejection>> {
    let raw = state.promote.as_ref()?;
    Some(PromoteRequest::parse(raw).and_then(|req| req.check(state, now).map(|()| req)))
}

/// Move the async at `index` (> 0) one place up the chain; the peer it
/// overtakes goes to the end.
pub fn reorder_asyncs(asyncs: &[Host], index: usize) -> Vec<Host> {
    debug_assert!(index > 0 && index < asyncs.len());
    let mut reordered = Vec::with_capacity(asyncs.len());
    reordered.extend_from_slice(&asyncs[..index - 1]);
    reordered.push(asyncs[index].clone());
    reordered.extend_from_slice(&asyncs[index + 1..]);
    reordered.push(asyncs[index - 1].clone());
    reordered
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use manatee_core::Position;
    use serde_json::json;

    fn host(n: u32) -> Host {
        Host::new(format!("node{n}"), format!("10.0.0.{n}"), format!("tcp://{n}"), format!("node{n}"))
    }

    fn state() -> ClusterState {
        ClusterState {
            generation: 2,
            primary: host(1),
            sync: Some(host(3)),
            asyncs: vec![host(5), host(2), host(6), host(4)],
            deposed: vec![],
            init_wal: Position::new(0, 10),
            freeze: None,
            single_node_mode: None,
            promote: None,
        }
    }

    fn request(body: Value) -> Result<PromoteRequest, PromoteRejection> {
        let now = Utc::now();
        let req = PromoteRequest::parse(&body)?;
        req.check(&state(), now)?;
        Ok(req)
    }

    fn expires() -> String {
        (Utc::now() + Duration::seconds(5)).to_rfc3339()
    }

    #[test]
    fn test_accepts_matching_requests() {
        let req = request(json!({
            "id": "node6", "role": "async", "asyncIndex": 2,
            "generation": 2, "expireTime": expires(),
        }))
        .unwrap();
        assert_eq!(req.role, PromoteRole::Async);
        assert_eq!(req.async_index, Some(2));

        assert!(request(json!({
            "id": "node3", "role": "sync", "generation": 2, "expireTime": expires(),
        }))
        .is_ok());
    }

    #[test]
    fn test_rejections() {
        let cases = [
            json!({ "id": "node1", "role": "primary", "generation": 2, "expireTime": expires() }),
            json!({ "id": "node1", "role": "test", "generation": 2, "expireTime": expires() }),
            json!({ "id": "node4", "role": "sync", "generation": 2, "expireTime": expires() }),
            json!({ "id": "node999", "role": "sync", "generation": 2, "expireTime": expires() }),
            json!({ "id": "node2", "role": "async", "asyncIndex": 2, "generation": 2, "expireTime": expires() }),
            json!({ "id": "node2", "role": "async", "asyncIndex": 999, "generation": 2, "expireTime": expires() }),
            json!({ "id": "node2", "role": "async", "asyncIndex": -1, "generation": 2, "expireTime": expires() }),
            json!({ "id": "node2", "role": "async", "asyncIndex": 1, "generation": 100, "expireTime": expires() }),
            json!({ "id": "node2", "role": "async", "asyncIndex": 1, "generation": 1, "expireTime": expires() }),
            json!({ "id": "node2", "role": "async", "asyncIndex": 1, "generation": "test", "expireTime": expires() }),
            json!({ "id": "node2", "role": "async", "asyncIndex": 1, "generation": 2, "expireTime": "test" }),
            json!({ "role": "async", "asyncIndex": 1, "generation": 2, "expireTime": expires() }),
        ];
        for case in cases {
            assert!(request(case.clone()).is_err(), "{case} should be ignored");
        }
    }

    #[test]
    fn test_expired_request() {
        let body = json!({
            "id": "node5", "role": "async", "asyncIndex": 0,
            "generation": 2, "expireTime": Utc::now().to_rfc3339(),
        });
        let req = PromoteRequest::parse(&body).unwrap();
        let later = req.expire_time + Duration::milliseconds(1);
        assert!(matches!(
            req.check(&state(), later),
            Err(PromoteRejection::Expired(_))
        ));
    }

    #[test]
    fn test_pending_request_reads_state() {
        let mut s = state();
        assert!(pending_request(&s, Utc::now()).is_none());

        s.promote = Some(json!({
            "id": "node5", "role": "async", "asyncIndex": 0,
            "generation": 2, "expireTime": expires(),
        }));
        assert!(matches!(pending_request(&s, Utc::now()), Some(Ok(_))));
    }

    #[test]
    fn test_reorder_moves_overtaken_peer_to_end() {
        let ids = |hosts: Vec<Host>| hosts.into_iter().map(|h| h.id).collect::<Vec<_>>();

        let chain = vec![host(4), host(5), host(6), host(2)];
        let chain = reorder_asyncs(&chain, 3);
        assert_eq!(ids(chain.clone()), ["node4", "node5", "node2", "node6"]);

        let chain = reorder_asyncs(&chain, 1);
        assert_eq!(ids(chain), ["node5", "node2", "node6", "node4"]);
    }
}
