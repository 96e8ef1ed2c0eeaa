//! Public façade: connect, authenticate, load, and act on a panel session
//! (§4.7, §4.8, §6 "Public API surface").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::auth;
use crate::capability::{self, Capabilities};
use crate::codec::endian::encode_id_bitmap;
use crate::commands::{cmd, ArmingAction, DoorAction};
use crate::config::PanelConfig;
use crate::error::{Error, Result};
use crate::history::{format_tables, FormatTable, HistoryDialect, HistoryEvent, HistoryLog};
use crate::loader::{LoadSelector, Loader};
use crate::model::PanelModel;
use crate::multiplexer::Multiplexer;
use crate::observable::Observable;
use crate::subscription::{self, Finalizer, SubscriptionFlags};
use crate::supervisor;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Liveness view exposed to callers and fed by the supervisor (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Everything one connection attempt needs after capability negotiation.
pub(crate) struct Connected {
    pub(crate) mux: Arc<Multiplexer>,
    pub(crate) caps: Capabilities,
}

/// Background tasks tied to one live connection, torn down together on
/// disconnect or reconnect.
struct ConnectionTasks {
    reader: JoinHandle<()>,
    poll: Option<JoinHandle<()>>,
}

impl ConnectionTasks {
    fn abort(&self) {
        self.reader.abort();
        if let Some(poll) = &self.poll {
            poll.abort();
        }
    }
}

/// All mutable session state, shared between the façade and the supervisor
/// task via `Arc`. Model and history are guarded individually so readers
/// never block on an in-flight write to the other (§9 "Ownership model").
pub(crate) struct Session {
    pub(crate) config: PanelConfig,
    pub(crate) model: RwLock<PanelModel>,
    pub(crate) history: Mutex<HistoryLog>,
    pub(crate) table: FormatTable,
    pub(crate) connected: RwLock<Option<Connected>>,
    status: RwLock<ConnectionStatus>,
    tasks: Mutex<Option<ConnectionTasks>>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    /// Set once by an explicit `Panel::disconnect()`; distinguishes that
    /// from the supervisor's own internal resets (idle timeout, skew probe),
    /// which must keep reconnecting (§5 "disconnect cancels the supervisor").
    user_disconnected: AtomicBool,
    pub(crate) status_observable: Observable<ConnectionStatus>,
    pub(crate) history_observable: Observable<()>,
    pub(crate) faults_observable: Observable<u16>,
}

impl Session {
    fn new(config: PanelConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            model: RwLock::new(PanelModel::new()),
            history: Mutex::new(HistoryLog::new()),
            table: FormatTable::new(),
            connected: RwLock::new(None),
            status: RwLock::new(ConnectionStatus::Disconnected),
            tasks: Mutex::new(None),
            supervisor: Mutex::new(None),
            user_disconnected: AtomicBool::new(false),
            status_observable: Observable::new(),
            history_observable: Observable::new(),
            faults_observable: Observable::new(),
        })
    }

    pub(crate) async fn set_supervisor_handle(&self, handle: JoinHandle<()>) {
        *self.supervisor.lock().await = Some(handle);
    }

    pub(crate) fn is_user_disconnected(&self) -> bool {
        self.user_disconnected.load(Ordering::Acquire)
    }

    async fn set_status(&self, status: ConnectionStatus) {
        *self.status.write().await = status;
        self.status_observable.notify(&status);
    }

    pub(crate) async fn status(&self) -> ConnectionStatus {
        *self.status.read().await
    }

    pub(crate) fn default_table(&self, dialect: HistoryDialect) -> FormatTable {
        match dialect {
            HistoryDialect::Solution => format_tables::default_solution_table(),
            HistoryDialect::Amax => format_tables::default_amax_table(),
            HistoryDialect::BG => format_tables::default_bg_table(),
        }
    }

    /// Dial, negotiate capabilities, authenticate, and run the requested
    /// load phases. Does not touch background tasks; the caller starts
    /// those once this returns (§4.5, §4.3, §4.4).
    pub(crate) async fn connect_once(&self, selector: LoadSelector) -> Result<()> {
        self.set_status(ConnectionStatus::Connecting).await;
        let stream = self.config.tls_provider.connect(self.config.addr).await?;
        let mux = Multiplexer::new(stream, 1);

        let caps = negotiate_capabilities(&mux).await?;
        if caps.in_flight_limit > 1 {
            mux.add_permits(caps.in_flight_limit - 1);
        }

        auth::authenticate(&mux, caps.history_dialect, &self.config.credentials).await?;

        {
            let loader = Loader::new(&mux, &caps);
            let mut model = self.model.write().await;

            if selector.extended_info {
                let (serial, firmware) = loader.load_extended_info().await?;
                model.info.serial_number = serial;
                model.info.firmware_version = firmware;
                model.info.protocol_version = Some(format!("v{}.{}", caps.protocol_major, caps.protocol_minor));
                model.info.model = Some(caps.model);
            }

            if selector.entities {
                model.areas = loader.load_areas().await?;
                model.points = loader.load_points().await?;
                model.outputs = loader.load_outputs().await?;
                model.doors = loader.load_doors().await?;
            }

            if selector.status {
                let area_ids: Vec<u16> = model.areas.keys().copied().collect();
                for (id, status) in loader.load_entity_status(cmd::AREA_STATUS, &area_ids).await? {
                    if let Some(area) = model.areas.get_mut(&id) {
                        area.set_status(crate::model::AreaStatus::from_wire(status));
                    }
                }
                let point_ids: Vec<u16> = model.points.keys().copied().collect();
                for (id, status) in loader.load_entity_status(cmd::POINT_STATUS, &point_ids).await? {
                    if let Some(point) = model.points.get_mut(&id) {
                        point.set_status(crate::model::PointStatus::from_wire(status));
                    }
                }
                if !model.doors.is_empty() {
                    let door_ids: Vec<u16> = model.doors.keys().copied().collect();
                    for (id, status) in loader.load_entity_status(cmd::DOOR_STATUS, &door_ids).await? {
                        if let Some(door) = model.doors.get_mut(&id) {
                            door.set_status(crate::model::DoorStatus::from_wire(status));
                        }
                    }
                }
                let active_outputs = loader.load_output_active_set().await?;
                for (id, output) in model.outputs.iter_mut() {
                    output.set_status(crate::model::OutputStatus::from_enabled_bit(active_outputs.contains(id)));
                }

                loader.load_alarm_status(&mut model.areas).await?;

                let mut history = self.history.lock().await;
                loader.load_history(&model.areas, &mut history).await?;
                self.history_observable.notify(&());

                let reply = mux.send_command(cmd::PANEL_SYSTEM_STATUS, Vec::new()).await.ok();
                if let Some(reply) = reply {
                    if reply.len() >= 3 {
                        let faults = crate::codec::endian::be_u16(&reply, 1);
                        model.info.faults_bitmap = faults;
                        self.faults_observable.notify(&faults);
                    }
                }
            }
        }

        if caps.subscription_format > 0 {
            let payload = subscription::build_subscription_payload(caps.subscription_format, SubscriptionFlags::default());
            mux.send_command(cmd::SET_SUBSCRIPTION, payload).await?;
        }

        *self.connected.write().await = Some(Connected { mux, caps });
        self.set_status(ConnectionStatus::Connected).await;
        Ok(())
    }

    /// Tear down the current transport: abort background tasks, drop the
    /// multiplexer (failing every pending waiter), reset entity statuses
    /// but keep the id→entity map and the history log (§3, §4.7).
    pub(crate) async fn teardown(&self) {
        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.abort();
        }
        if let Some(connected) = self.connected.write().await.take() {
            connected.mux.fail_all_pending("connection torn down").await;
        }
        self.model.write().await.reset_all_statuses();
        self.history.lock().await.reset_for_reconnect();
        self.set_status(ConnectionStatus::Disconnected).await;
    }

    pub(crate) async fn start_connection_tasks(self: &Arc<Self>) {
        let connected = self.connected.read().await;
        let Some(connected) = connected.as_ref() else { return };
        let mux = connected.mux.clone();
        let dialect = connected.caps.history_dialect;
        let subscribed = connected.caps.subscription_format > 0;
        drop(connected);

        let reader = tokio::spawn(run_notification_loop(self.clone(), mux.clone(), dialect));
        let poll = if subscribed { None } else { Some(tokio::spawn(run_poll_loop(self.clone()))) };
        *self.tasks.lock().await = Some(ConnectionTasks { reader, poll });
    }
}

async fn negotiate_capabilities(mux: &Multiplexer) -> Result<Capabilities> {
    let (code, payload) = capability::request_format3();
    let reply = match mux.send_command(code, payload).await {
        Ok(reply) => reply,
        Err(Error::Nack { .. }) => {
            let (code, payload) = capability::request_format1();
            mux.send_command(code, payload).await?
        }
        Err(e) => return Err(e),
    };
    capability::negotiate(&reply)
}

/// Drain notifications for one connection, dispatching each group and
/// acting on the finalizers it schedules (§4.6).
async fn run_notification_loop(session: Arc<Session>, mux: Arc<Multiplexer>, dialect: HistoryDialect) {
    loop {
        match mux.next_event().await {
            Ok(crate::multiplexer::MuxEvent::ResponseDelivered) => continue,
            Ok(crate::multiplexer::MuxEvent::Notification(payload)) => {
                let finalizers = {
                    let mut model = session.model.write().await;
                    let mut history = session.history.lock().await;
                    let table = session.default_table(dialect);
                    subscription::dispatch_notification(&payload, &mut model, dialect, &table, &mut history)
                };
                for finalizer in finalizers {
                    handle_finalizer(session.clone(), mux.clone(), dialect, finalizer);
                }
            }
            Err(e) => {
                warn!(error = %e, "connection read loop ended");
                return;
            }
        }
    }
}

fn handle_finalizer(session: Arc<Session>, mux: Arc<Multiplexer>, dialect: HistoryDialect, finalizer: Finalizer) {
    tokio::spawn(async move {
        match finalizer {
            Finalizer::RefreshAlarmPriority(priority) => {
                let connected = session.connected.read().await;
                let Some(connected) = connected.as_ref() else { return };
                let loader = Loader::new(&mux, &connected.caps);
                let mut model = session.model.write().await;
                if let Err(e) = loader.refresh_alarm_priority(priority, &mut model.areas).await {
                    warn!(error = %e, "failed to refresh alarm priority");
                }
            }
            Finalizer::HistoryReloadNow => reload_history(&session, &mux, dialect).await,
            Finalizer::HistoryReloadDelayed => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                reload_history(&session, &mux, dialect).await;
            }
            Finalizer::PollOutputBitmap => {
                let connected = session.connected.read().await;
                let Some(connected) = connected.as_ref() else { return };
                let loader = Loader::new(&mux, &connected.caps);
                match loader.load_output_active_set().await {
                    Ok(active) => {
                        let mut model = session.model.write().await;
                        for (id, output) in model.outputs.iter_mut() {
                            output.set_status(crate::model::OutputStatus::from_enabled_bit(active.contains(id)));
                        }
                    }
                    Err(e) => warn!(error = %e, "failed to poll output bitmap"),
                }
            }
        }
    });
}

async fn reload_history(session: &Arc<Session>, mux: &Arc<Multiplexer>, _dialect: HistoryDialect) {
    let connected = session.connected.read().await;
    let Some(connected) = connected.as_ref() else { return };
    let loader = Loader::new(mux, &connected.caps);
    let model = session.model.read().await;
    let mut history = session.history.lock().await;
    if let Err(e) = loader.load_history(&model.areas, &mut history).await {
        warn!(error = %e, "delayed history reload failed");
        return;
    }
    drop(model);
    drop(history);
    session.history_observable.notify(&());
}

/// Fallback 1s status poll used when the panel doesn't support
/// subscriptions (§4.6 "Otherwise start a periodic poll task").
async fn run_poll_loop(session: Arc<Session>) {
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let connected = session.connected.read().await;
        let Some(connected) = connected.as_ref() else { return };
        let loader = Loader::new(&connected.mux, &connected.caps);
        let mut model = session.model.write().await;
        let area_ids: Vec<u16> = model.areas.keys().copied().collect();
        let point_ids: Vec<u16> = model.points.keys().copied().collect();
        drop(connected);

        if let Ok(statuses) = loader_status(&loader, cmd::AREA_STATUS, &area_ids).await {
            for (id, status) in statuses {
                if let Some(area) = model.areas.get_mut(&id) {
                    area.set_status(crate::model::AreaStatus::from_wire(status));
                }
            }
        }
        if let Ok(statuses) = loader_status(&loader, cmd::POINT_STATUS, &point_ids).await {
            for (id, status) in statuses {
                if let Some(point) = model.points.get_mut(&id) {
                    point.set_status(crate::model::PointStatus::from_wire(status));
                }
            }
        }
        if let Err(e) = loader.load_alarm_status(&mut model.areas).await {
            warn!(error = %e, "poll: alarm status load failed");
        }
        drop(model);

        let connected = session.connected.read().await;
        if let Some(connected) = connected.as_ref() {
            let loader = Loader::new(&connected.mux, &connected.caps);
            let model = session.model.read().await;
            let mut history = session.history.lock().await;
            let _ = loader.load_history(&model.areas, &mut history).await;
        }
    }
}

async fn loader_status(loader: &Loader<'_>, cmd: u8, ids: &[u16]) -> Result<std::collections::BTreeMap<u16, u8>> {
    loader.load_entity_status(cmd, ids).await
}

/// Handle to a connected panel session. Cheaply cloneable; every clone
/// shares the same underlying state (§6 "Public API surface").
#[derive(Clone)]
pub struct Panel {
    session: Arc<Session>,
}

impl Panel {
    /// Connect, authenticate, and run `selector`'s load phases, then start
    /// the supervisor and subscription/poll tasks. Bounded by a 30s
    /// connect timeout (§5 "Cancellation/timeouts").
    pub async fn connect(config: PanelConfig, selector: LoadSelector) -> Result<Self> {
        let session = Session::new(config);
        tokio::time::timeout(CONNECT_TIMEOUT, session.connect_once(selector))
            .await
            .map_err(|_| Error::Timeout)??;
        session.start_connection_tasks().await;

        let supervisor_session = session.clone();
        let supervisor_handle = tokio::spawn(supervisor::run(supervisor_session));
        session.set_supervisor_handle(supervisor_handle).await;

        info!("panel session established");
        Ok(Self { session })
    }

    /// Cancel the supervisor and background tasks, then tear down the
    /// transport (§5 "disconnect cancels the supervisor, awaits its exit,
    /// then aborts the transport"). Marks the session as user-disconnected
    /// first so the supervisor, if it wakes mid-teardown, does not race to
    /// reconnect what this call just closed.
    pub async fn disconnect(&self) {
        self.session.user_disconnected.store(true, Ordering::Release);
        let handle = self.session.supervisor.lock().await.take();
        if let Some(handle) = handle {
            handle.abort();
            let _ = handle.await;
        }
        self.session.teardown().await;
    }

    async fn connected_caps(&self) -> Result<(Arc<Multiplexer>, Capabilities)> {
        let connected = self.session.connected.read().await;
        let connected = connected.as_ref().ok_or(Error::NotConnected)?;
        Ok((connected.mux.clone(), connected.caps.clone()))
    }

    async fn area_arm(&self, area_id: u16, arm_type: ArmingAction) -> Result<()> {
        let (mux, _) = self.connected_caps().await?;
        let mut request = vec![arm_type.code()];
        request.extend_from_slice(&encode_id_bitmap(area_id));
        mux.send_command(cmd::AREA_ARM, request).await?;
        Ok(())
    }

    pub async fn area_disarm(&self, area_id: u16) -> Result<()> {
        self.area_arm(area_id, ArmingAction::Disarm).await
    }

    pub async fn area_arm_part(&self, area_id: u16) -> Result<()> {
        let (_, caps) = self.connected_caps().await?;
        self.area_arm(area_id, caps.partial_arm).await
    }

    pub async fn area_arm_all(&self, area_id: u16) -> Result<()> {
        let (_, caps) = self.connected_caps().await?;
        self.area_arm(area_id, caps.all_arm).await
    }

    async fn output_action(&self, output_id: u16, active: bool) -> Result<()> {
        let (mux, _) = self.connected_caps().await?;
        let action = if active { 0x01 } else { 0x00 };
        mux.send_command(cmd::SET_OUTPUT_STATE, vec![output_id as u8, action]).await?;
        Ok(())
    }

    pub async fn set_output_active(&self, output_id: u16) -> Result<()> {
        self.output_action(output_id, true).await
    }

    pub async fn set_output_inactive(&self, output_id: u16) -> Result<()> {
        self.output_action(output_id, false).await
    }

    async fn door_action(&self, door_id: u16, action: DoorAction) -> Result<()> {
        let (mux, _) = self.connected_caps().await?;
        mux.send_command(cmd::SET_DOOR_STATE, vec![door_id as u8, action.code()]).await?;
        Ok(())
    }

    pub async fn door_unlock(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DoorAction::Unlock).await
    }

    pub async fn door_cycle(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DoorAction::Cycle).await
    }

    pub async fn door_relock(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DoorAction::TerminateUnlock).await
    }

    pub async fn door_unsecure(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DoorAction::TerminateSecure).await
    }

    pub async fn door_secure(&self, door_id: u16) -> Result<()> {
        self.door_action(door_id, DoorAction::Secure).await
    }

    /// Set the panel's clock. Validates `2010 <= year <= 2037` before
    /// touching the wire (§4.8).
    pub async fn set_panel_date(&self, date: chrono::NaiveDateTime) -> Result<()> {
        use chrono::{Datelike, Timelike};
        let year = date.year();
        if !(2010..=2037).contains(&year) {
            return Err(Error::configuration(format!("panel year must be 2010..=2037, got {year}")));
        }
        let (mux, _) = self.connected_caps().await?;
        let payload = vec![date.month() as u8, date.day() as u8, (year - 2000) as u8, date.hour() as u8, date.minute() as u8];
        mux.send_command(cmd::SET_DATE_TIME, payload).await?;
        Ok(())
    }

    pub async fn get_panel_date(&self) -> Result<chrono::NaiveDateTime> {
        let (mux, _) = self.connected_caps().await?;
        let reply = mux.send_command(cmd::REQUEST_DATE_TIME, Vec::new()).await?;
        if reply.len() < 5 {
            return Err(Error::decode("panel date reply shorter than 5 bytes"));
        }
        let (month, day, year, hour, minute) = (reply[0] as u32, reply[1] as u32, 2000 + reply[2] as i32, reply[3] as u32, reply[4] as u32);
        let date = chrono::NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| Error::decode("panel returned an invalid date"))?;
        let time = chrono::NaiveTime::from_hms_opt(hour, minute, 0).ok_or_else(|| Error::decode("panel returned an invalid time"))?;
        Ok(chrono::NaiveDateTime::new(date, time))
    }

    pub async fn connection_status(&self) -> ConnectionStatus {
        self.session.status().await
    }

    pub async fn events(&self) -> Vec<HistoryEvent> {
        self.session.history.lock().await.events().to_vec()
    }

    pub async fn with_model<R>(&self, f: impl FnOnce(&PanelModel) -> R) -> R {
        f(&*self.session.model.read().await)
    }

    pub fn status_observable(&self) -> &Observable<ConnectionStatus> {
        &self.session.status_observable
    }

    pub fn history_observable(&self) -> &Observable<()> {
        &self.session.history_observable
    }

    pub fn faults_observable(&self) -> &Observable<u16> {
        &self.session.faults_observable
    }

    pub(crate) fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_session_starts_disconnected() {
        let config = PanelConfig::new(
            "127.0.0.1:7700".parse().unwrap(),
            crate::config::Credentials::default(),
        );
        let session = Session::new(config);
        assert_eq!(session.status().await, ConnectionStatus::Disconnected);
    }
}
