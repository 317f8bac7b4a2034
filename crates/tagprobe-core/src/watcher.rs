//! Adapter power-state watcher.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::adapter::BleAdapter;
use crate::state::Action;
use crate::store::Store;

/// Republish every adapter power-state notification as an
/// [`Action::AdapterStateChanged`], in delivery order, until cancelled.
///
/// The subscription is released before this function returns, and no
/// action is dispatched once cancellation has been observed.
#[instrument(skip_all)]
pub async fn watch_adapter_state(
    adapter: Arc<dyn BleAdapter>,
    store: Arc<Store>,
    token: CancellationToken,
) {
    let subscribed = tokio::select! {
        biased;
        _ = token.cancelled() => return,
        subscribed = adapter.power_state_changes() => subscribed,
    };
    let mut states = match subscribed {
        Ok(states) => states,
        Err(e) => {
            warn!("Failed to subscribe to adapter state: {}", e);
            store.dispatch(Action::log_error(&e));
            return;
        }
    };

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            state = states.recv() => match state {
                Some(state) => {
                    info!("Adapter state: {}", state);
                    store.dispatch(Action::AdapterStateChanged(state));
                }
                None => {
                    debug!("Adapter state notifications closed");
                    break;
                }
            },
        }
    }

    states.close();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockAdapter;
    use tagprobe_types::AdapterState;

    #[tokio::test]
    async fn test_republishes_current_then_changes() {
        let adapter = Arc::new(MockAdapter::new());
        let store = Arc::new(Store::new());
        let token = CancellationToken::new();
        let mut seen = store.subscribe(&[crate::state::ActionKind::AdapterStateChanged]);

        let task = tokio::spawn(watch_adapter_state(
            adapter.clone(),
            Arc::clone(&store),
            token.clone(),
        ));

        assert_eq!(
            seen.recv().await,
            Some(Action::AdapterStateChanged(AdapterState::PoweredOn))
        );
        adapter.set_power_state(AdapterState::PoweredOff);
        adapter.set_power_state(AdapterState::PoweredOn);
        assert_eq!(
            seen.recv().await,
            Some(Action::AdapterStateChanged(AdapterState::PoweredOff))
        );
        assert_eq!(
            seen.recv().await,
            Some(Action::AdapterStateChanged(AdapterState::PoweredOn))
        );

        token.cancel();
        task.await.unwrap();
        assert_eq!(adapter.power_subscriber_count(), 0);

        adapter.set_power_state(AdapterState::PoweredOff);
        assert_eq!(store.state().adapter_state, AdapterState::PoweredOn);
    }
}
