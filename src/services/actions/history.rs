//! Bounded undo/redo stack over recorded actions.

use std::collections::VecDeque;
use std::sync::Arc;

use log::info;

use crate::database::{action_repo, Store};
use crate::services::actions::{HistoryAction, RecordedAction};
use crate::services::config::Settings;
use crate::types::models::DbId;
use crate::types::{StoreError, StoreResult};

pub const DEFAULT_UNDO_HISTORY_SIZE: usize = 50;

struct HistoryState {
    /// Oldest at the front, newest at the back.
    actions: VecDeque<Arc<RecordedAction>>,
    /// Undone actions stay above this index until overwritten.
    top: usize,
    max_size: usize,
}

pub struct ActionHistory {
    store: Arc<Store>,
    settings: Settings,
    state: tokio::sync::Mutex<HistoryState>,
}

impl ActionHistory {
    pub fn new(store: Arc<Store>, settings: Settings, max_size: usize) -> Self {
        store.set_max_action_history(max_size.max(1) as u32);
        Self {
            store,
            settings,
            state: tokio::sync::Mutex::new(HistoryState {
                actions: VecDeque::new(),
                top: 0,
                max_size: max_size.max(1),
            }),
        }
    }

    /// Performs the action and appends it to history. Anything that was
    /// undone and not redone is discarded; the oldest entries are purged
    /// once the stack exceeds its limit.
    pub async fn record(&self, action: HistoryAction) -> StoreResult<Arc<RecordedAction>> {
        let mut conn = self.store.conn().await?;

        let description = action.generate_description();
        let id = action_repo::insert_action(
            &mut conn,
            action.action_type() as i64,
            &action.serialize_payload(),
            &description,
        )
        .await?;

        let recorded = Arc::new(RecordedAction::new(id, description, action));
        match recorded.redo(&self.store, &mut conn).await {
            Ok(true) => {}
            Ok(false) => {
                action_repo::delete_action(&mut conn, id).await?;
                return Err(StoreError::InvalidState(
                    "action could not be performed".into(),
                ));
            }
            Err(e) => {
                action_repo::delete_action(&mut conn, id).await?;
                return Err(e);
            }
        }

        let mut state = self.state.lock().await;
        let top = state.top;
        state.actions.truncate(top);
        state.actions.push_back(recorded.clone());
        state.top = state.actions.len();

        while state.actions.len() > state.max_size {
            if let Some(oldest) = state.actions.pop_front() {
                info!("Purging oldest action {} out of history", oldest.id);
                oldest.purge(&self.store, &mut conn, &self.settings).await?;
                let new_top = state.top.saturating_sub(1);
                state.top = new_top;
            }
        }

        Ok(recorded)
    }

    /// Undoes the latest still-performed action.
    ///
    /// The connection is acquired before the state lock; `record` orders
    /// its locks the same way.
    pub async fn undo(&self) -> StoreResult<bool> {
        let mut conn = self.store.conn().await?;
        let mut state = self.state.lock().await;
        if state.top == 0 {
            return Ok(false);
        }

        let action = state.actions[state.top - 1].clone();
        if !action.undo(&self.store, &mut conn).await? {
            return Ok(false);
        }

        state.top -= 1;
        Ok(true)
    }

    /// Redoes the latest undone action.
    pub async fn redo(&self) -> StoreResult<bool> {
        let mut conn = self.store.conn().await?;
        let mut state = self.state.lock().await;
        if state.top >= state.actions.len() {
            return Ok(false);
        }

        let action = state.actions[state.top].clone();
        if !action.redo(&self.store, &mut conn).await? {
            return Ok(false);
        }

        state.top += 1;
        Ok(true)
    }

    pub async fn can_undo(&self) -> bool {
        self.state.lock().await.top > 0
    }

    pub async fn can_redo(&self) -> bool {
        let state = self.state.lock().await;
        state.top < state.actions.len()
    }

    pub async fn set_max_history(&self, max_size: usize) {
        let mut state = self.state.lock().await;
        state.max_size = max_size.max(1);
        self.store.set_max_action_history(state.max_size as u32);
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.actions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.actions.is_empty()
    }
}

/// Loads a stored action so its `undo` behaves like the in-memory
/// original's would.
pub async fn load_action(store: &Store, id: DbId) -> StoreResult<Option<Arc<RecordedAction>>> {
    let mut conn = store.conn().await?;
    let row = action_repo::select_action_by_id(&mut conn, id).await?;
    match row {
        Some(row) => Ok(Some(Arc::new(RecordedAction::from_row(&row)?))),
        None => Ok(None),
    }
}

/// Purges stored actions oldest-first until at most `keep` remain. Used
/// at startup when the configured history size shrank.
pub async fn purge_old_actions_until(
    store: &Store,
    settings: &Settings,
    keep: u32,
) -> StoreResult<u64> {
    let mut conn = store.conn().await?;
    let mut purged = 0_u64;

    while action_repo::count_actions(&mut conn).await? > keep as i64 {
        let Some(row) = action_repo::select_oldest_action(&mut conn).await? else {
            break;
        };
        let action = RecordedAction::from_row(&row)?;
        action.purge(store, &mut conn, settings).await?;
        purged += 1;
    }

    Ok(purged)
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
