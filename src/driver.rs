//! # Engine Driver
//!
//! Async loop that owns a [`LogDownloader`] and feeds it, one at a time:
//! link events, caller commands, the request deadline and the rate tick.
//!
//! ```text
//! transport ──LinkEvent──▶ ┌────────┐
//! caller ────Command─────▶ │  run() │ ──▶ LogDownloader ──VehicleLink──▶ transport
//! deadline / rate tick ──▶ └────────┘
//! ```

use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::protocol::{LinkEvent, VehicleLink};
use crate::transfer::LogDownloader;

/// Caller requests accepted by [`run`]
#[derive(Debug)]
pub enum Command<L> {
    Refresh,
    /// Download the selection, optionally into a different directory
    Download(Option<PathBuf>),
    EraseAll,
    Cancel,
    Select { id: u16, selected: bool },
    SelectAll,
    /// Swap the vehicle link and its event stream (`None` when the vehicle
    /// went away)
    SetLink(Option<(L, mpsc::UnboundedReceiver<LinkEvent>)>),
    /// Stop the loop and hand the engine back
    Shutdown,
}

/// Run `engine` until `Shutdown` or until the command channel closes
///
/// When the link event channel closes the vehicle is treated as lost and
/// the link is detached. `SetLink` attaches a new link together with the
/// channel its events arrive on.
pub async fn run<L: VehicleLink>(
    mut engine: LogDownloader<L>,
    mut link_events: mpsc::UnboundedReceiver<LinkEvent>,
    mut commands: mpsc::UnboundedReceiver<Command<L>>,
) -> LogDownloader<L> {
    let mut rate_tick = interval(engine.rate_tick());
    rate_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut link_open = true;

    info!("Log download driver started");

    loop {
        let deadline = engine.deadline();
        let generation = engine.armed_timeout();

        tokio::select! {
            event = link_events.recv(), if link_open => match event {
                Some(LinkEvent::Entry(msg)) => engine.on_entry(msg),
                Some(LinkEvent::Data(msg)) => engine.on_data(msg),
                Some(LinkEvent::TransportError(reason)) => engine.on_transport_error(&reason),
                None => {
                    warn!("Vehicle link closed");
                    link_open = false;
                    engine.set_link(None);
                }
            },

            command = commands.recv() => match command {
                Some(Command::Shutdown) | None => {
                    info!("Log download driver shutting down");
                    break;
                }
                Some(Command::SetLink(Some((link, events)))) => {
                    link_events = events;
                    link_open = true;
                    engine.set_link(Some(link));
                }
                Some(Command::SetLink(None)) => {
                    link_open = false;
                    engine.set_link(None);
                }
                Some(command) => apply(&mut engine, command),
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                if let Some(generation) = generation {
                    debug!(generation, "Request deadline reached");
                    engine.on_timeout(generation);
                }
            }

            _ = rate_tick.tick() => engine.on_rate_tick(Instant::now()),
        }
    }

    engine
}

fn apply<L: VehicleLink>(engine: &mut LogDownloader<L>, command: Command<L>) {
    match command {
        Command::Refresh => engine.refresh(),
        Command::Download(dir) => engine.download(dir),
        Command::EraseAll => engine.erase_all(),
        Command::Cancel => engine.cancel(),
        Command::Select { id, selected } => {
            if !engine.select(id, selected) {
                warn!("Cannot change selection of log {}", id);
            }
        }
        Command::SelectAll => {
            let count = engine.select_all();
            debug!("Selected {} log(s)", count);
        }
        // Handled by the loop, which owns the event stream
        Command::SetLink(_) | Command::Shutdown => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EntryStatus;
    use crate::config::{Config, Firmware};
    use crate::protocol::link::mocks::RecordingLink;
    use crate::protocol::{ChannelLink, LinkRequest, LogEntryMsg};
    use crate::sim::SimulatedVehicle;
    use crate::transfer::{DownloadEvent, Phase};
    use std::fs;
    use tempfile::TempDir;
    use tokio::sync::broadcast::error::TryRecvError;

    struct Harness {
        commands: mpsc::UnboundedSender<Command<ChannelLink>>,
        state: tokio::sync::watch::Receiver<crate::transfer::EngineState>,
        events: tokio::sync::broadcast::Receiver<DownloadEvent>,
        driver: tokio::task::JoinHandle<LogDownloader<ChannelLink>>,
        expected: Vec<bytes::Bytes>,
    }

    fn start(config: &Config) -> Harness {
        let vehicle = SimulatedVehicle::from_config(&config.simulator, config.vehicle.firmware);
        let expected = vehicle.logs().iter().map(|l| l.data.clone()).collect();

        let (link, requests) = ChannelLink::pair();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(vehicle.serve(requests, event_tx));

        let engine = LogDownloader::with_link(config, link);
        let state = engine.subscribe_state();
        let events = engine.subscribe();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run(engine, event_rx, command_rx));

        Harness {
            commands,
            state,
            events,
            driver,
            expected,
        }
    }

    fn lossy_config(dir: &TempDir, firmware: Firmware) -> Config {
        let mut config = Config::default();
        config.download.output_dir = dir.path().to_string_lossy().into_owned();
        config.download.max_request_bytes = 4500;
        config.vehicle.firmware = firmware;
        config.simulator.num_logs = 3;
        config.simulator.log_size = 20_000;
        config.simulator.drop_every = 7;
        config
    }

    async fn download_everything(h: &mut Harness) -> LogDownloader<ChannelLink> {
        h.commands.send(Command::Refresh).unwrap();
        h.state
            .wait_for(|s| s.phase == Phase::ListingComplete)
            .await
            .unwrap();

        h.commands.send(Command::SelectAll).unwrap();
        h.commands.send(Command::Download(None)).unwrap();
        h.state
            .wait_for(|s| s.phase == Phase::DownloadComplete)
            .await
            .unwrap();

        h.commands.send(Command::Shutdown).unwrap();
        (&mut h.driver).await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_lossy_px4() {
        let dir = TempDir::new().unwrap();
        let mut h = start(&lossy_config(&dir, Firmware::Px4));

        let engine = download_everything(&mut h).await;

        for (id, bytes) in h.expected.iter().enumerate() {
            let entry = engine.catalog().get(id as u16).unwrap();
            assert_eq!(entry.status, EntryStatus::Downloaded);
            let stamp = entry.time_utc.unwrap().format("%Y-%-m-%-d-%H-%M-%S");
            let name = format!("log_{}_{}.ulg", id, stamp);
            assert_eq!(fs::read(dir.path().join(name)).unwrap(), bytes.to_vec());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_end_to_end_lossy_ardupilot() {
        let dir = TempDir::new().unwrap();
        let mut h = start(&lossy_config(&dir, Firmware::ArduPilot));

        let engine = download_everything(&mut h).await;

        assert_eq!(engine.catalog().len(), h.expected.len());
        let mut files: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "bin"))
            .collect();
        files.sort();
        assert_eq!(files.len(), 3);
        for (path, bytes) in files.iter().zip(&h.expected) {
            assert_eq!(fs::read(path).unwrap(), bytes.to_vec());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_events_published() {
        let dir = TempDir::new().unwrap();
        let mut config = lossy_config(&dir, Firmware::Px4);
        config.simulator.num_logs = 1;
        let mut h = start(&config);

        download_everything(&mut h).await;

        let mut finished = None;
        let mut progress = 0;
        loop {
            match h.events.try_recv() {
                Ok(DownloadEvent::DownloadFinished { downloaded, failed }) => {
                    finished = Some((downloaded, failed));
                }
                Ok(DownloadEvent::Progress { .. }) => progress += 1,
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(_) => break,
            }
        }
        assert!(progress > 0);
        assert_eq!(finished, Some((1, 0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_vehicle_times_out() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.download.output_dir = dir.path().to_string_lossy().into_owned();

        let link = RecordingLink::new();
        let engine = LogDownloader::with_link(&config, link.clone());
        let mut state = engine.subscribe_state();
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run(engine, event_rx, command_rx));

        commands.send(Command::Refresh).unwrap();
        state
            .wait_for(|s| s.phase == Phase::ListingComplete)
            .await
            .unwrap();

        // Initial request plus two retries
        assert_eq!(link.requests().len(), 3);
        commands.send(Command::Shutdown).unwrap();
        let engine = driver.await.unwrap();
        assert!(engine.catalog().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_command_stops_download() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.download.output_dir = dir.path().to_string_lossy().into_owned();

        let link = RecordingLink::new();
        let engine = LogDownloader::with_link(&config, link.clone());
        let mut state = engine.subscribe_state();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run(engine, event_rx, command_rx));

        commands.send(Command::Refresh).unwrap();
        state.wait_for(|s| s.requesting_list).await.unwrap();
        event_tx
            .send(LinkEvent::Entry(LogEntryMsg {
                time_utc: 0,
                size: 1000,
                id: 0,
                num_logs: 1,
                last_log_num: 0,
            }))
            .unwrap();
        state
            .wait_for(|s| s.phase == Phase::ListingComplete)
            .await
            .unwrap();

        commands.send(Command::Select { id: 0, selected: true }).unwrap();
        commands.send(Command::Download(None)).unwrap();
        state.wait_for(|s| s.downloading_logs).await.unwrap();

        commands.send(Command::Cancel).unwrap();
        state.wait_for(|s| s.phase == Phase::Idle).await.unwrap();

        assert_eq!(link.requests().last(), Some(&LinkRequest::EndSession));
        assert!(!dir.path().join("log_0_UnknownDate.ulg").exists());

        commands.send(Command::Shutdown).unwrap();
        driver.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_link_detaches() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.download.output_dir = dir.path().to_string_lossy().into_owned();

        let engine = LogDownloader::with_link(&config, RecordingLink::new());
        let mut state = engine.subscribe_state();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<LinkEvent>();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run(engine, event_rx, command_rx));

        commands.send(Command::Refresh).unwrap();
        state.wait_for(|s| s.requesting_list).await.unwrap();

        drop(event_tx);
        state.wait_for(|s| s.phase == Phase::Idle).await.unwrap();

        commands.send(Command::Shutdown).unwrap();
        let engine = driver.await.unwrap();
        assert!(engine.link().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reattached_link_completes_listing() {
        let dir = TempDir::new().unwrap();
        let mut config = lossy_config(&dir, Firmware::Px4);
        config.simulator.drop_every = 0;

        let (first_link, _first_requests) = ChannelLink::pair();
        let engine = LogDownloader::with_link(&config, first_link);
        let mut state = engine.subscribe_state();
        let (first_tx, first_rx) = mpsc::unbounded_channel::<LinkEvent>();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run(engine, first_rx, command_rx));

        commands.send(Command::Refresh).unwrap();
        state.wait_for(|s| s.requesting_list).await.unwrap();
        drop(first_tx);
        state.wait_for(|s| s.phase == Phase::Idle).await.unwrap();

        let vehicle = SimulatedVehicle::from_config(&config.simulator, config.vehicle.firmware);
        let (link, requests) = ChannelLink::pair();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        tokio::spawn(vehicle.serve(requests, event_tx));

        commands.send(Command::SetLink(Some((link, event_rx)))).unwrap();
        commands.send(Command::Refresh).unwrap();
        state
            .wait_for(|s| s.phase == Phase::ListingComplete)
            .await
            .unwrap();

        commands.send(Command::Shutdown).unwrap();
        let engine = driver.await.unwrap();
        assert!(engine.link().is_some());
        assert_eq!(engine.catalog().len(), 3);
        assert!(engine.catalog().iter().all(|e| e.status == EntryStatus::Available));
    }

    #[tokio::test]
    async fn test_dropping_command_sender_stops_driver() {
        let config = Config::default();
        let engine: LogDownloader<RecordingLink> = LogDownloader::new(&config);
        let (_event_tx, event_rx) = mpsc::unbounded_channel();
        let (commands, command_rx) = mpsc::unbounded_channel();
        let driver = tokio::spawn(run(engine, event_rx, command_rx));

        drop(commands);
        let engine = tokio_test::assert_ok!(driver.await);
        assert_eq!(engine.phase(), Phase::Idle);
    }
}
