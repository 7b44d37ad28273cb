//! # Simulated Ledger
//!
//! An in-memory PixelBoard contract behind the [`RemoteLedger`] seam.
//! It decodes real calldata, keeps its own grid, optionally enforces the
//! contract cooldown and emits `PixelUpdated` logs to subscribers.
//!
//! Faults can be injected per call kind:
//!
//! | Fault                        | Effect                                   |
//! |------------------------------|------------------------------------------|
//! | [`SimulatedLedger::fail_rows`]        | `getRow(y)` is unavailable      |
//! | [`SimulatedLedger::set_unreachable`]  | every call is unavailable       |
//! | [`SimulatedLedger::set_latency`]      | every call sleeps first         |
//! | [`SimulatedLedger::reject_next_submission`] | user declines next signature |
//! | [`SimulatedLedger::revert_next_submission`] | next submission reverts     |
//! | [`SimulatedLedger::hold_submissions`] | submissions wait for a release  |

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{SolCall, SolInterface};
use async_trait::async_trait;
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tracing::debug;

use pixelwar_core::{Clock, Coord, Grid, GridSize, Rgb, SystemClock, Timestamp};

use crate::contracts::IPixelBoard::{self, IPixelBoardCalls};
use crate::events::PixelChange;
use crate::ledger::{LedgerError, LedgerResult, LogStream, RawLog, RemoteLedger, TxReceipt, TxStatus};

/// Capacity of each subscriber channel.
const SUBSCRIBER_CAPACITY: usize = 1024;

/// Call counters.
#[derive(Debug, Default)]
pub struct SimulationStats {
    /// Read calls received, including failed ones.
    pub calls: AtomicU64,
    /// Transactions received, including failed ones.
    pub submissions: AtomicU64,
    /// Transactions that changed a pixel.
    pub accepted: AtomicU64,
}

#[derive(Clone, Copy)]
struct Cell {
    wire: u32,
    last_changed_secs: u64,
}

struct Board {
    size: GridSize,
    cells: Vec<Cell>,
    last_by_account: HashMap<Address, Timestamp>,
    block_number: u64,
    tx_counter: u64,
}

#[derive(Default)]
struct Faults {
    failing_rows: HashSet<u32>,
    unreachable: bool,
    latency: Duration,
    reject_next: bool,
    revert_next: Option<String>,
}

struct Subscriber {
    sender: Sender<RawLog>,
    active: Arc<AtomicBool>,
}

/// In-memory PixelBoard.
pub struct SimulatedLedger {
    contract: Address,
    cooldown: Option<Duration>,
    clock: Arc<dyn Clock>,
    board: Mutex<Board>,
    faults: Mutex<Faults>,
    subscribers: Mutex<Vec<Subscriber>>,
    held: AtomicBool,
    gate: Semaphore,
    waiting: AtomicUsize,
    stats: SimulationStats,
}

impl SimulatedLedger {
    /// Creates a board of `size` filled with black, deployed at `contract`.
    #[must_use]
    pub fn new(size: GridSize, contract: Address) -> Self {
        Self::from_grid(&Grid::filled(size, Rgb::BLACK), contract)
    }

    /// Creates a board with the given contents.
    #[must_use]
    pub fn from_grid(grid: &Grid, contract: Address) -> Self {
        let cells = grid
            .rows()
            .flat_map(|row| row.iter())
            .map(|c| Cell {
                wire: c.to_wire(),
                last_changed_secs: 0,
            })
            .collect();
        Self {
            contract,
            cooldown: None,
            clock: Arc::new(SystemClock),
            board: Mutex::new(Board {
                size: grid.size(),
                cells,
                last_by_account: HashMap::new(),
                block_number: 1,
                tx_counter: 0,
            }),
            faults: Mutex::new(Faults::default()),
            subscribers: Mutex::new(Vec::new()),
            held: AtomicBool::new(false),
            gate: Semaphore::new(0),
            waiting: AtomicUsize::new(0),
            stats: SimulationStats::default(),
        }
    }

    /// Uses `clock` for block timestamps and the cooldown.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Enforces one placement per account per `window`, like the contract.
    #[must_use]
    pub const fn with_cooldown(mut self, window: Duration) -> Self {
        self.cooldown = Some(window);
        self
    }

    /// Deployed address.
    #[must_use]
    pub const fn contract(&self) -> Address {
        self.contract
    }

    /// Call counters.
    #[must_use]
    pub const fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    /// Read calls plus transactions received so far.
    #[must_use]
    pub fn total_requests(&self) -> u64 {
        self.stats.calls.load(Ordering::SeqCst) + self.stats.submissions.load(Ordering::SeqCst)
    }

    /// Current on-chain color.
    #[must_use]
    pub fn pixel(&self, coord: Coord) -> Option<Rgb> {
        let board = self.board.lock();
        board
            .size
            .contains(coord)
            .then(|| Rgb::from_wire(board.cells[board.size.index_of(coord)].wire))
    }

    /// Current on-chain grid.
    #[must_use]
    pub fn grid(&self) -> Grid {
        let board = self.board.lock();
        let cells = board.cells.iter().map(|c| Rgb::from_wire(c.wire)).collect();
        Grid::from_cells(board.size, cells).unwrap_or_else(|_| Grid::filled(board.size, Rgb::BLACK))
    }

    /// Another account paints a pixel directly, bypassing the cooldown.
    ///
    /// # Errors
    ///
    /// `Reverted` if `coord` is off the board.
    pub fn paint_as(&self, who: Address, coord: Coord, color: Rgb) -> LedgerResult<PixelChange> {
        let change = self.board.lock().write(coord, color.to_wire(), who, self.clock.now())?;
        self.emit(&change);
        Ok(change)
    }

    /// Makes `getRow` fail for each listed row.
    pub fn fail_rows(&self, rows: impl IntoIterator<Item = u32>) {
        self.faults.lock().failing_rows.extend(rows);
    }

    /// Clears every row failure.
    pub fn heal_rows(&self) {
        self.faults.lock().failing_rows.clear();
    }

    /// Makes every call fail as unreachable.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.faults.lock().unreachable = unreachable;
    }

    /// Delays every call.
    pub fn set_latency(&self, latency: Duration) {
        self.faults.lock().latency = latency;
    }

    /// The next transaction is declined by the account holder.
    pub fn reject_next_submission(&self) {
        self.faults.lock().reject_next = true;
    }

    /// The next transaction reverts with `reason`.
    pub fn revert_next_submission(&self, reason: impl Into<String>) {
        self.faults.lock().revert_next = Some(reason.into());
    }

    /// Transactions wait for [`Self::release_submissions`] before executing.
    pub fn hold_submissions(&self) {
        self.held.store(true, Ordering::SeqCst);
    }

    /// Lets `n` held transactions proceed.
    pub fn release_submissions(&self, n: usize) {
        self.gate.add_permits(n);
    }

    /// Stops holding and lets every waiting transaction proceed.
    pub fn release_all(&self) {
        self.held.store(false, Ordering::SeqCst);
        self.gate.add_permits(self.waiting.load(Ordering::SeqCst).max(1));
    }

    /// Transactions currently waiting on the hold.
    #[must_use]
    pub fn held_submissions(&self) -> usize {
        self.waiting.load(Ordering::SeqCst)
    }

    /// Live subscriber count.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|s| s.active.load(Ordering::Relaxed));
        subscribers.len()
    }

    async fn enter(&self) -> LedgerResult<()> {
        let latency = self.faults.lock().latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if self.faults.lock().unreachable {
            return Err(LedgerError::Unavailable("simulated ledger unreachable".to_string()));
        }
        Ok(())
    }

    async fn wait_for_release(&self) {
        if !self.held.load(Ordering::SeqCst) {
            return;
        }
        self.waiting.fetch_add(1, Ordering::SeqCst);
        if let Ok(permit) = self.gate.acquire().await {
            permit.forget();
        }
        self.waiting.fetch_sub(1, Ordering::SeqCst);
    }

    fn emit(&self, change: &PixelChange) {
        let (topics, data) = change.to_log_parts();
        let log = RawLog {
            address: self.contract,
            topics,
            data,
            block_number: change.block_number,
        };
        self.subscribers.lock().retain(|s| {
            if !s.active.load(Ordering::Relaxed) {
                return false;
            }
            match s.sender.try_send(log.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            }
        });
    }

    fn read(&self, data: &[u8]) -> LedgerResult<Vec<u8>> {
        let call = IPixelBoardCalls::abi_decode(data, true)
            .map_err(|e| LedgerError::Reverted(format!("unknown call: {e}")))?;
        let board = self.board.lock();
        match call {
            IPixelBoardCalls::getRow(IPixelBoard::getRowCall { y }) => {
                let y = board.row_index(y)?;
                if self.faults.lock().failing_rows.contains(&y) {
                    return Err(LedgerError::Unavailable(format!("row {y} unavailable")));
                }
                let width = board.size.width() as usize;
                let start = y as usize * width;
                let colors: Vec<u32> = board.cells[start..start + width].iter().map(|c| c.wire).collect();
                Ok(IPixelBoard::getRowCall::abi_encode_returns(&(colors,)))
            }
            IPixelBoardCalls::getPixel(IPixelBoard::getPixelCall { x, y }) => {
                let coord = board.coord(x, y)?;
                let cell = board.cells[board.size.index_of(coord)];
                Ok(IPixelBoard::getPixelCall::abi_encode_returns(&(
                    cell.wire,
                    U256::from(cell.last_changed_secs),
                )))
            }
            IPixelBoardCalls::setPixel(_) => Ok(Vec::new()),
        }
    }

    fn execute(&self, from: Address, data: &[u8]) -> LedgerResult<(TxReceipt, Option<PixelChange>)> {
        {
            let mut faults = self.faults.lock();
            if std::mem::take(&mut faults.reject_next) {
                return Err(LedgerError::UserRejected);
            }
        }

        let now = self.clock.now();
        let mut board = self.board.lock();
        board.tx_counter += 1;
        let tx_hash = B256::from(U256::from(board.tx_counter).to_be_bytes::<32>());

        let (status, block_number, change) = match self.set_pixel(&mut board, from, data, now) {
            Ok(change) => {
                board.last_by_account.insert(from, now);
                (TxStatus::Success, change.block_number, Some(change))
            }
            Err(reason) => {
                let block_number = board.block_number;
                board.block_number += 1;
                (TxStatus::Reverted(reason), block_number, None)
            }
        };

        Ok((
            TxReceipt {
                tx_hash,
                block_number,
                status,
                timestamp: Some(Timestamp::from_secs(now.as_secs())),
            },
            change,
        ))
    }
}

impl SimulatedLedger {
    /// Contract-side checks for `setPixel`; the error is the revert reason.
    fn set_pixel(
        &self,
        board: &mut Board,
        from: Address,
        data: &[u8],
        now: Timestamp,
    ) -> Result<PixelChange, String> {
        if let Some(reason) = self.faults.lock().revert_next.take() {
            return Err(reason);
        }
        let call = IPixelBoard::setPixelCall::abi_decode(data, true)
            .map_err(|e| format!("unknown call: {e}"))?;
        let coord = board.coord(call.x, call.y).map_err(|e| e.to_string())?;
        if let (Some(window), Some(last)) = (self.cooldown, board.last_by_account.get(&from)) {
            if now.saturating_since(*last) < window {
                return Err("cooldown active".to_string());
            }
        }
        board.write(coord, call.color, from, now).map_err(|e| e.to_string())
    }
}

impl Board {
    fn row_index(&self, y: U256) -> LedgerResult<u32> {
        u32::try_from(y)
            .ok()
            .filter(|&y| y < self.size.height())
            .ok_or_else(|| LedgerError::Reverted("row out of range".to_string()))
    }

    fn coord(&self, x: U256, y: U256) -> LedgerResult<Coord> {
        let y = self.row_index(y)?;
        u32::try_from(x)
            .ok()
            .filter(|&x| x < self.size.width())
            .map(|x| Coord::new(x, y))
            .ok_or_else(|| LedgerError::Reverted("column out of range".to_string()))
    }

    fn write(&mut self, coord: Coord, wire: u32, who: Address, now: Timestamp) -> LedgerResult<PixelChange> {
        if !self.size.contains(coord) {
            return Err(LedgerError::Reverted("pixel out of range".to_string()));
        }
        let index = self.size.index_of(coord);
        let color = Rgb::from_wire(wire);
        self.cells[index] = Cell {
            wire: color.to_wire(),
            last_changed_secs: now.as_secs(),
        };
        let block_number = self.block_number;
        self.block_number += 1;
        Ok(PixelChange {
            coord,
            color,
            who,
            timestamp: Timestamp::from_secs(now.as_secs()),
            block_number,
        })
    }
}

#[async_trait]
impl RemoteLedger for SimulatedLedger {
    async fn call(&self, to: Address, data: Vec<u8>) -> LedgerResult<Vec<u8>> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        if to != self.contract {
            return Err(LedgerError::Reverted(format!("no contract at {to}")));
        }
        self.read(&data)
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Vec<u8>,
    ) -> LedgerResult<TxReceipt> {
        self.stats.submissions.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.wait_for_release().await;
        if self.faults.lock().unreachable {
            return Err(LedgerError::Unavailable("simulated ledger unreachable".to_string()));
        }
        if to != self.contract {
            return Err(LedgerError::Reverted(format!("no contract at {to}")));
        }

        let (receipt, change) = self.execute(from, &data)?;
        if let Some(change) = change {
            self.stats.accepted.fetch_add(1, Ordering::SeqCst);
            debug!(x = change.coord.x, y = change.coord.y, color = %change.color, "simulated setPixel");
            self.emit(&change);
        }
        Ok(receipt)
    }

    fn subscribe_logs(&self, contract: Address) -> Option<LogStream> {
        if contract != self.contract {
            return None;
        }
        let (sender, receiver) = bounded(SUBSCRIBER_CAPACITY);
        let active = Arc::new(AtomicBool::new(true));
        self.subscribers.lock().push(Subscriber {
            sender,
            active: Arc::clone(&active),
        });
        Some(LogStream::new(receiver, active))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts;
    use crate::events::EventParser;
    use pixelwar_core::ManualClock;

    const CONTRACT: Address = Address::repeat_byte(0xC0);

    fn ledger() -> SimulatedLedger {
        SimulatedLedger::new(GridSize::new(3, 2).unwrap(), CONTRACT)
    }

    #[tokio::test]
    async fn test_row_read_and_write() {
        let sim = ledger();
        let red = Rgb::new(0xFF, 0, 0);
        let receipt = sim
            .send_transaction(
                Address::repeat_byte(1),
                CONTRACT,
                contracts::set_pixel_calldata(Coord::new(2, 1), red),
            )
            .await
            .unwrap();
        assert_eq!(receipt.status, TxStatus::Success);

        let bytes = sim.call(CONTRACT, contracts::get_row_calldata(1)).await.unwrap();
        let row = contracts::decode_row(&bytes).unwrap();
        assert_eq!(row, vec![0, 0, 0x00FF_0000]);
        assert_eq!(sim.stats().accepted.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_out_of_range_row_reverts() {
        let sim = ledger();
        let result = sim.call(CONTRACT, contracts::get_row_calldata(2)).await;
        assert!(matches!(result, Err(LedgerError::Reverted(_))));
    }

    #[tokio::test]
    async fn test_contract_cooldown_reverts() {
        let clock = Arc::new(ManualClock::new(Timestamp::from_secs(1_000)));
        let sim = ledger()
            .with_clock(clock.clone())
            .with_cooldown(Duration::from_secs(60));
        let who = Address::repeat_byte(7);
        let data = contracts::set_pixel_calldata(Coord::new(0, 0), Rgb::WHITE);

        let first = sim.send_transaction(who, CONTRACT, data.clone()).await.unwrap();
        assert_eq!(first.status, TxStatus::Success);
        let second = sim.send_transaction(who, CONTRACT, data.clone()).await.unwrap();
        assert_eq!(second.status, TxStatus::Reverted("cooldown active".to_string()));

        clock.advance(Duration::from_secs(60));
        let third = sim.send_transaction(who, CONTRACT, data).await.unwrap();
        assert_eq!(third.status, TxStatus::Success);
    }

    #[tokio::test]
    async fn test_injected_faults() {
        let sim = ledger();
        sim.fail_rows([1]);
        assert!(sim.call(CONTRACT, contracts::get_row_calldata(0)).await.is_ok());
        assert!(matches!(
            sim.call(CONTRACT, contracts::get_row_calldata(1)).await,
            Err(LedgerError::Unavailable(_))
        ));

        let data = contracts::set_pixel_calldata(Coord::new(0, 0), Rgb::WHITE);
        sim.reject_next_submission();
        assert_eq!(
            sim.send_transaction(Address::ZERO, CONTRACT, data.clone()).await,
            Err(LedgerError::UserRejected)
        );
        sim.revert_next_submission("nope");
        let receipt = sim.send_transaction(Address::ZERO, CONTRACT, data).await.unwrap();
        assert_eq!(receipt.status, TxStatus::Reverted("nope".to_string()));
        assert_eq!(sim.pixel(Coord::new(0, 0)), Some(Rgb::BLACK));

        sim.set_unreachable(true);
        assert!(matches!(
            sim.call(CONTRACT, contracts::get_row_calldata(0)).await,
            Err(LedgerError::Unavailable(_))
        ));
    }

    #[test]
    fn test_subscribers_receive_changes() {
        let sim = ledger();
        let stream = sim.subscribe_logs(CONTRACT).unwrap();
        let change = sim
            .paint_as(Address::repeat_byte(9), Coord::new(1, 0), Rgb::WHITE)
            .unwrap();

        let log = stream.receiver().try_recv().unwrap();
        let parsed = EventParser::parse_pixel_updated(&log.topics, &log.data, log.block_number);
        assert_eq!(parsed, Some(change));

        drop(stream);
        assert_eq!(sim.subscriber_count(), 0);
        assert!(sim.subscribe_logs(Address::ZERO).is_none());
    }
}
