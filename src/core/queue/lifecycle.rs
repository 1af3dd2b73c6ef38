use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::core::delivery::time_keeper;
use crate::core::error::QueueError;
use crate::core::events::QueueEvent;
use crate::core::message::{headers, Headers};
use crate::core::queue::manager::QueueManagerBuilder;
use crate::core::queue::options::QueueDestroy;
use crate::core::queue::{state, Queue, QueueStatus};

impl Queue {
    /// Binds a manager and a state using the named factory (or the broker's
    /// default). Does nothing if the queue is already initialized.
    pub async fn initialize(self: &Arc<Self>, manager: Option<&str>) -> Result<(), QueueError> {
        let mut init_headers = Headers::new();
        if let Some(manager) = manager {
            init_headers.insert(headers::QUEUE_MANAGER, manager);
        }
        self.ensure_initialized(&init_headers).await
    }

    pub(crate) async fn ensure_initialized(self: &Arc<Self>, message_headers: &Headers) -> Result<(), QueueError> {
        if self.is_initialized() {
            return Ok(());
        }
        if self.is_destroyed() {
            return Err(QueueError::Destroyed(self.name.clone()));
        }

        let _guard = self.queue_lock.lock().await;
        if self.is_initialized() {
            return Ok(());
        }

        if self.status() == QueueStatus::NotInitialized {
            self.options.write().apply_headers(message_headers);
        }
        if let Some(topic) = message_headers.get(headers::QUEUE_TOPIC) {
            self.set_topic(Some(topic.to_owned()));
        }

        let manager_name = message_headers
            .get(headers::QUEUE_MANAGER)
            .unwrap_or(self.broker.options().default_manager.as_str())
            .to_owned();
        let factory = self
            .broker
            .manager_factory(&manager_name)
            .ok_or_else(|| QueueError::ManagerNotFound(manager_name.clone()))?;

        let options = self.options();
        let builder = QueueManagerBuilder {
            queue: self.name.clone(),
            manager: manager_name.clone(),
            options: options.clone(),
            headers: message_headers.clone(),
        };
        let manager = factory(builder)
            .await
            .map_err(|source| QueueError::Initialization {
                queue: self.name.clone(),
                source,
            })?;
        manager
            .initialize()
            .await
            .map_err(|source| QueueError::Initialization {
                queue: self.name.clone(),
                source,
            })?;

        // the state goes first: a bound manager marks the queue initialized
        let _ = self.state.set(state::create(options.queue_type));
        let _ = self.manager.set(manager);

        let started = {
            let mut status = self.status.write();
            let started = *status == QueueStatus::NotInitialized;
            if started {
                *status = QueueStatus::Running;
            }
            started
        };
        if started {
            self.broker.publish(QueueEvent::StatusChanged {
                queue: self.name.clone(),
                from: QueueStatus::NotInitialized,
                to: QueueStatus::Running,
            });
        }

        self.start_maintenance();
        info!(
            target: "relaymq::queue",
            queue = %self.name,
            manager = %manager_name,
            queue_type = ?options.queue_type,
            "Queue initialized"
        );
        Ok(())
    }

    /// Changes the status after every status observer agreed.
    ///
    /// `NotInitialized` is never applied; `Destroyed` destroys the queue.
    pub async fn set_status(self: &Arc<Self>, status: QueueStatus) -> bool {
        if status == QueueStatus::NotInitialized || self.is_destroyed() {
            return false;
        }
        if status == QueueStatus::Destroyed {
            self.destroy().await;
            return true;
        }

        let previous = self.status();
        if previous == status {
            return true;
        }

        for handler in self.broker.queue_event_handlers() {
            if !handler.on_status_changed(self, previous, status).await {
                debug!(
                    target: "relaymq::queue",
                    queue = %self.name,
                    from = ?previous,
                    to = ?status,
                    "Status change vetoed"
                );
                return false;
            }
        }

        if status == QueueStatus::Syncing {
            let guard = Arc::clone(&self.queue_lock).lock_owned().await;
            *self.sync_guard.lock() = Some(guard);
        }

        *self.status.write() = status;

        if previous == QueueStatus::Syncing {
            self.sync_guard.lock().take();
        }
        if status == QueueStatus::Running {
            self.schedule_trigger();
        }

        self.broker.publish(QueueEvent::StatusChanged {
            queue: self.name.clone(),
            from: previous,
            to: status,
        });
        info!(
            target: "relaymq::queue",
            queue = %self.name,
            from = ?previous,
            to = ?status,
            "Queue status changed"
        );
        true
    }

    /// Tears the queue down. Calling it again is a no-op.
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }

        *self.status.write() = QueueStatus::Destroyed;
        self.sync_guard.lock().take();
        self.release_acknowledge_lock(false);
        self.maintenance.lock().take();

        // let the running holder of the FIFO lock finish
        drop(self.queue_lock.lock().await);

        if let Some(manager) = self.manager.get() {
            if let Err(error) = manager.destroy().await {
                self.broker.send_error("DESTROY", &error, None);
            }
        }

        let clients = std::mem::take(&mut *self.clients.write());
        for client in &clients {
            client.client().remove_subscription(&self.name);
        }

        self.broker.unregister_queue(self);
        self.broker.cluster().send_queue_removed(&self.name);
        self.broker.publish(QueueEvent::Destroyed {
            queue: self.name.clone(),
        });
        info!(target: "relaymq::queue", queue = %self.name, "Queue destroyed");
    }

    /// Destroys the queue if its auto-destroy rule holds. Returns true when
    /// the queue got destroyed.
    pub async fn check_auto_destroy(&self) -> bool {
        if self.is_destroyed() {
            return false;
        }

        let no_consumers = || self.clients_count() == 0;
        let no_messages = || {
            self.is_empty()
                && self
                    .manager
                    .get()
                    .map_or(true, |m| m.delivery_handler().tracker().outstanding_count() == 0)
        };

        let destroy = match self.options().auto_destroy {
            QueueDestroy::Disabled => false,
            QueueDestroy::NoConsumers => no_consumers(),
            QueueDestroy::NoMessages => no_messages(),
            QueueDestroy::Empty => no_consumers() && no_messages(),
        };

        if destroy {
            debug!(target: "relaymq::queue", queue = %self.name, "Auto-destroy rule matched");
            self.destroy().await;
        }
        destroy
    }

    /// Re-arms an idle trigger and evaluates auto-destroy.
    pub(crate) async fn run_maintenance(self: &Arc<Self>) {
        if !self.is_empty() && self.clients_count() > 0 {
            self.schedule_trigger();
        }
        self.check_auto_destroy().await;
    }

    fn start_maintenance(self: &Arc<Self>) {
        let (shutdown_tx, mut shutdown) = watch::channel(false);
        *self.maintenance.lock() = Some(shutdown_tx);

        let options = self.broker.options();
        let maintenance_every = options.maintenance_interval();
        let time_keeper_every = options.time_keeper_interval();
        let queue = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut maintenance = interval(maintenance_every);
            maintenance.set_missed_tick_behavior(MissedTickBehavior::Skip);
            maintenance.tick().await;
            let mut keeper = interval(time_keeper_every);
            keeper.set_missed_tick_behavior(MissedTickBehavior::Skip);
            keeper.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = keeper.tick() => {
                        let Some(queue) = queue.upgrade() else { break };
                        time_keeper::run(&queue).await;
                    }
                    _ = maintenance.tick() => {
                        let Some(queue) = queue.upgrade() else { break };
                        queue.run_maintenance().await;
                        if queue.is_destroyed() {
                            break;
                        }
                    }
                }
            }
            debug!(target: "relaymq::queue", "Maintenance task stopped");
        });
    }
}
