use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockroom_catalog::{MaterialId, SerialNumber};
use stockroom_core::{
    ActorId, Aggregate, AggregateId, AggregateRoot, ConsumerId, DomainError, DomainEvent,
};

/// Allocation identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(pub AggregateId);

impl AllocationId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AllocationId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// How the reserved stock reaches the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ShippingMode {
    /// Shipped ahead of time via a carrier.
    AdvanceShipment,
    /// Carried along by staff; custody is recorded at withdrawal.
    WithStaff,
}

/// Carrier/tracking metadata attached when stock goes in transit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierInfo {
    pub carrier: String,
    pub tracking_code: Option<String>,
}

/// Person taking custody of the stock at withdrawal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Custodian {
    pub name: String,
    pub document: Option<String>,
    pub phone: Option<String>,
}

/// Custody handoff as recorded on the allocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyRecord {
    pub custodian: Custodian,
    pub withdrawn_at: DateTime<Utc>,
}

/// Lifecycle state of an allocation.
///
/// Forward path: `Reserved → Separated → InTransit → Delivered`, with
/// `Withdrawn` as an optional custody sub-state after delivery. A return
/// outcome moves the allocation to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AllocationState {
    Reserved,
    Separated,
    InTransit,
    Delivered,
    Withdrawn,
    Closed,
}

impl AllocationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationState::Reserved => "reserved",
            AllocationState::Separated => "separated",
            AllocationState::InTransit => "in-transit",
            AllocationState::Delivered => "delivered",
            AllocationState::Withdrawn => "withdrawn",
            AllocationState::Closed => "closed",
        }
    }
}

/// Terminal outcome of a return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnOutcome {
    /// Stock came back usable; availability is restored.
    ReturnedOk,
    /// Stock came back unusable. Serial units go to maintenance; fungible
    /// quantity is scrapped (permanent shrinkage).
    ReturnedDamaged,
    /// Stock never came back (permanent shrinkage).
    Lost,
    /// Stock was used up as intended, e.g. disposables (permanent shrinkage,
    /// quantity-controlled materials only).
    Consumed,
}

/// What the allocation binds: a fungible quantity or one serial unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StockRef {
    Quantity { allocated: u64 },
    Serial { serial: SerialNumber },
}

/// Counter effect of a committed transition, applied by the ledger.
///
/// Deltas target the owning material's counters; a zero pair means the
/// transition has no counter effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDeltas {
    pub available: i64,
    pub total: i64,
}

impl CounterDeltas {
    pub const ZERO: CounterDeltas = CounterDeltas {
        available: 0,
        total: 0,
    };

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Serial status change implied by a committed transition, applied by the
/// serial unit tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SerialTransition {
    CheckOut,
    Release,
    SendToMaintenance,
    MarkLost,
}

/// Aggregate root: Allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Allocation {
    id: AllocationId,
    material_id: Option<MaterialId>,
    consumer_id: Option<ConsumerId>,
    stock: Option<StockRef>,
    quantity_returned: u64,
    shipping_mode: Option<ShippingMode>,
    carrier: Option<CarrierInfo>,
    custody: Option<CustodyRecord>,
    state: AllocationState,
    outcome: Option<ReturnOutcome>,
    version: u64,
    created: bool,
}

impl Allocation {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: AllocationId) -> Self {
        Self {
            id,
            material_id: None,
            consumer_id: None,
            stock: None,
            quantity_returned: 0,
            shipping_mode: None,
            carrier: None,
            custody: None,
            state: AllocationState::Reserved,
            outcome: None,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AllocationId {
        self.id
    }

    pub fn material_id(&self) -> Option<MaterialId> {
        self.material_id
    }

    pub fn consumer_id(&self) -> Option<ConsumerId> {
        self.consumer_id
    }

    pub fn stock(&self) -> Option<&StockRef> {
        self.stock.as_ref()
    }

    pub fn serial(&self) -> Option<&SerialNumber> {
        match &self.stock {
            Some(StockRef::Serial { serial }) => Some(serial),
            _ => None,
        }
    }

    pub fn quantity_allocated(&self) -> u64 {
        match &self.stock {
            Some(StockRef::Quantity { allocated }) => *allocated,
            Some(StockRef::Serial { .. }) => 1,
            None => 0,
        }
    }

    pub fn quantity_returned(&self) -> u64 {
        self.quantity_returned
    }

    /// Allocated minus returned-so-far (any outcome counts as processed).
    pub fn quantity_outstanding(&self) -> u64 {
        self.quantity_allocated() - self.quantity_returned
    }

    pub fn shipping_mode(&self) -> Option<ShippingMode> {
        self.shipping_mode
    }

    pub fn carrier(&self) -> Option<&CarrierInfo> {
        self.carrier.as_ref()
    }

    pub fn custody(&self) -> Option<&CustodyRecord> {
        self.custody.as_ref()
    }

    pub fn state(&self) -> AllocationState {
        self.state
    }

    pub fn outcome(&self) -> Option<ReturnOutcome> {
        self.outcome
    }

    pub fn is_open(&self) -> bool {
        self.created && self.state != AllocationState::Closed
    }
}

impl AggregateRoot for Allocation {
    type Id = AllocationId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: Reserve (quantity-controlled material).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reserve {
    pub allocation_id: AllocationId,
    pub material_id: MaterialId,
    pub consumer_id: ConsumerId,
    pub quantity: u64,
    pub shipping_mode: ShippingMode,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReserveSerial (one serial unit).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveSerial {
    pub allocation_id: AllocationId,
    pub material_id: MaterialId,
    pub consumer_id: ConsumerId,
    pub serial: SerialNumber,
    pub shipping_mode: ShippingMode,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Advance to the next forward stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advance {
    pub allocation_id: AllocationId,
    pub to: AllocationState,
    pub carrier: Option<CarrierInfo>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordWithdrawal (custody handoff after delivery).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordWithdrawal {
    pub allocation_id: AllocationId,
    pub custodian: Custodian,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Return stock with an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Return {
    pub allocation_id: AllocationId,
    pub outcome: ReturnOutcome,
    pub quantity: u64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Cancel (administrative correction of an open allocation).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancel {
    pub allocation_id: AllocationId,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationCommand {
    Reserve(Reserve),
    ReserveSerial(ReserveSerial),
    Advance(Advance),
    RecordWithdrawal(RecordWithdrawal),
    Return(Return),
    Cancel(Cancel),
}

/// Event: StockReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReserved {
    pub allocation_id: AllocationId,
    pub material_id: MaterialId,
    pub consumer_id: ConsumerId,
    pub quantity: u64,
    pub shipping_mode: ShippingMode,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SerialReserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialReserved {
    pub allocation_id: AllocationId,
    pub material_id: MaterialId,
    pub consumer_id: ConsumerId,
    pub serial: SerialNumber,
    pub shipping_mode: ShippingMode,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StageAdvanced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageAdvanced {
    pub allocation_id: AllocationId,
    pub material_id: MaterialId,
    pub from: AllocationState,
    pub to: AllocationState,
    pub carrier: Option<CarrierInfo>,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRecorded {
    pub allocation_id: AllocationId,
    pub material_id: MaterialId,
    pub custodian: Custodian,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockReturned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReturned {
    pub allocation_id: AllocationId,
    pub material_id: MaterialId,
    pub serial: Option<SerialNumber>,
    pub outcome: ReturnOutcome,
    pub quantity: u64,
    /// True when this return brings the outstanding quantity to zero.
    pub closes_allocation: bool,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: AllocationCancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationCancelled {
    pub allocation_id: AllocationId,
    pub material_id: MaterialId,
    pub serial: Option<SerialNumber>,
    /// Quantity still outstanding at cancellation; availability to restore.
    pub quantity_outstanding: u64,
    pub actor: ActorId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AllocationEvent {
    StockReserved(StockReserved),
    SerialReserved(SerialReserved),
    StageAdvanced(StageAdvanced),
    WithdrawalRecorded(WithdrawalRecorded),
    StockReturned(StockReturned),
    AllocationCancelled(AllocationCancelled),
}

impl AllocationEvent {
    /// Counter effect of the transition, to be applied by the ledger in the
    /// same atomic step as the state change.
    pub fn counter_deltas(&self) -> CounterDeltas {
        match self {
            AllocationEvent::StockReserved(e) => CounterDeltas {
                available: -(e.quantity as i64),
                total: 0,
            },
            AllocationEvent::SerialReserved(_) => CounterDeltas {
                available: -1,
                total: 0,
            },
            AllocationEvent::StageAdvanced(_) | AllocationEvent::WithdrawalRecorded(_) => {
                CounterDeltas::ZERO
            }
            AllocationEvent::StockReturned(e) => match (&e.serial, e.outcome) {
                (Some(_), ReturnOutcome::ReturnedOk) => CounterDeltas {
                    available: 1,
                    total: 0,
                },
                // The unit row remains (maintenance/lost), so the derived
                // serial counters do not move.
                (Some(_), ReturnOutcome::ReturnedDamaged | ReturnOutcome::Lost) => {
                    CounterDeltas::ZERO
                }
                // Rejected in `handle`; a serial unit cannot be consumed.
                (Some(_), ReturnOutcome::Consumed) => CounterDeltas::ZERO,
                (None, ReturnOutcome::ReturnedOk) => CounterDeltas {
                    available: e.quantity as i64,
                    total: 0,
                },
                (
                    None,
                    ReturnOutcome::ReturnedDamaged | ReturnOutcome::Lost | ReturnOutcome::Consumed,
                ) => CounterDeltas {
                    available: 0,
                    total: -(e.quantity as i64),
                },
            },
            AllocationEvent::AllocationCancelled(e) => match &e.serial {
                Some(_) => CounterDeltas {
                    available: 1,
                    total: 0,
                },
                None => CounterDeltas {
                    available: e.quantity_outstanding as i64,
                    total: 0,
                },
            },
        }
    }

    /// Serial unit status change implied by the transition, if any.
    pub fn serial_transition(&self) -> Option<(&SerialNumber, SerialTransition)> {
        match self {
            AllocationEvent::SerialReserved(e) => Some((&e.serial, SerialTransition::CheckOut)),
            AllocationEvent::StockReturned(e) => {
                let serial = e.serial.as_ref()?;
                let transition = match e.outcome {
                    ReturnOutcome::ReturnedOk => SerialTransition::Release,
                    ReturnOutcome::ReturnedDamaged => SerialTransition::SendToMaintenance,
                    ReturnOutcome::Lost => SerialTransition::MarkLost,
                    // Rejected in `handle`.
                    ReturnOutcome::Consumed => return None,
                };
                Some((serial, transition))
            }
            AllocationEvent::AllocationCancelled(e) => e
                .serial
                .as_ref()
                .map(|serial| (serial, SerialTransition::Release)),
            AllocationEvent::StockReserved(_)
            | AllocationEvent::StageAdvanced(_)
            | AllocationEvent::WithdrawalRecorded(_) => None,
        }
    }

    pub fn actor(&self) -> ActorId {
        match self {
            AllocationEvent::StockReserved(e) => e.actor,
            AllocationEvent::SerialReserved(e) => e.actor,
            AllocationEvent::StageAdvanced(e) => e.actor,
            AllocationEvent::WithdrawalRecorded(e) => e.actor,
            AllocationEvent::StockReturned(e) => e.actor,
            AllocationEvent::AllocationCancelled(e) => e.actor,
        }
    }
}

impl DomainEvent for AllocationEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AllocationEvent::StockReserved(_) => "allocation.stock_reserved",
            AllocationEvent::SerialReserved(_) => "allocation.serial_reserved",
            AllocationEvent::StageAdvanced(_) => "allocation.stage_advanced",
            AllocationEvent::WithdrawalRecorded(_) => "allocation.withdrawal_recorded",
            AllocationEvent::StockReturned(_) => "allocation.stock_returned",
            AllocationEvent::AllocationCancelled(_) => "allocation.cancelled",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AllocationEvent::StockReserved(e) => e.occurred_at,
            AllocationEvent::SerialReserved(e) => e.occurred_at,
            AllocationEvent::StageAdvanced(e) => e.occurred_at,
            AllocationEvent::WithdrawalRecorded(e) => e.occurred_at,
            AllocationEvent::StockReturned(e) => e.occurred_at,
            AllocationEvent::AllocationCancelled(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Allocation {
    type Command = AllocationCommand;
    type Event = AllocationEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AllocationEvent::StockReserved(e) => {
                self.id = e.allocation_id;
                self.material_id = Some(e.material_id);
                self.consumer_id = Some(e.consumer_id);
                self.stock = Some(StockRef::Quantity {
                    allocated: e.quantity,
                });
                self.quantity_returned = 0;
                self.shipping_mode = Some(e.shipping_mode);
                self.state = AllocationState::Reserved;
                self.created = true;
            }
            AllocationEvent::SerialReserved(e) => {
                self.id = e.allocation_id;
                self.material_id = Some(e.material_id);
                self.consumer_id = Some(e.consumer_id);
                self.stock = Some(StockRef::Serial {
                    serial: e.serial.clone(),
                });
                self.quantity_returned = 0;
                self.shipping_mode = Some(e.shipping_mode);
                self.state = AllocationState::Reserved;
                self.created = true;
            }
            AllocationEvent::StageAdvanced(e) => {
                self.state = e.to;
                if e.carrier.is_some() {
                    self.carrier = e.carrier.clone();
                }
            }
            AllocationEvent::WithdrawalRecorded(e) => {
                self.state = AllocationState::Withdrawn;
                self.custody = Some(CustodyRecord {
                    custodian: e.custodian.clone(),
                    withdrawn_at: e.occurred_at,
                });
            }
            AllocationEvent::StockReturned(e) => {
                self.quantity_returned += e.quantity;
                if e.closes_allocation {
                    self.state = AllocationState::Closed;
                    self.outcome = Some(e.outcome);
                }
            }
            AllocationEvent::AllocationCancelled(_) => {
                self.state = AllocationState::Closed;
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AllocationCommand::Reserve(cmd) => self.handle_reserve(cmd),
            AllocationCommand::ReserveSerial(cmd) => self.handle_reserve_serial(cmd),
            AllocationCommand::Advance(cmd) => self.handle_advance(cmd),
            AllocationCommand::RecordWithdrawal(cmd) => self.handle_record_withdrawal(cmd),
            AllocationCommand::Return(cmd) => self.handle_return(cmd),
            AllocationCommand::Cancel(cmd) => self.handle_cancel(cmd),
        }
    }
}

impl Allocation {
    fn ensure_open(&self) -> Result<(), DomainError> {
        if !self.created {
            return Err(DomainError::not_found(format!("allocation {}", self.id)));
        }
        if self.state == AllocationState::Closed {
            return Err(DomainError::invalid_transition(format!(
                "allocation {} is closed",
                self.id
            )));
        }
        Ok(())
    }

    fn handle_reserve(&self, cmd: &Reserve) -> Result<Vec<AllocationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("allocation already exists"));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("reserved quantity must be positive"));
        }

        Ok(vec![AllocationEvent::StockReserved(StockReserved {
            allocation_id: cmd.allocation_id,
            material_id: cmd.material_id,
            consumer_id: cmd.consumer_id,
            quantity: cmd.quantity,
            shipping_mode: cmd.shipping_mode,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reserve_serial(
        &self,
        cmd: &ReserveSerial,
    ) -> Result<Vec<AllocationEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("allocation already exists"));
        }

        Ok(vec![AllocationEvent::SerialReserved(SerialReserved {
            allocation_id: cmd.allocation_id,
            material_id: cmd.material_id,
            consumer_id: cmd.consumer_id,
            serial: cmd.serial.clone(),
            shipping_mode: cmd.shipping_mode,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_advance(&self, cmd: &Advance) -> Result<Vec<AllocationEvent>, DomainError> {
        self.ensure_open()?;

        // Strictly the next forward stage; everything else is out of order.
        let expected = match self.state {
            AllocationState::Reserved => Some(AllocationState::Separated),
            AllocationState::Separated => Some(AllocationState::InTransit),
            AllocationState::InTransit => Some(AllocationState::Delivered),
            AllocationState::Delivered | AllocationState::Withdrawn | AllocationState::Closed => {
                None
            }
        };

        if expected != Some(cmd.to) {
            return Err(DomainError::invalid_transition(format!(
                "cannot advance allocation {} from {} to {}",
                self.id,
                self.state.as_str(),
                cmd.to.as_str()
            )));
        }

        let material_id = self
            .material_id
            .ok_or_else(|| DomainError::invariant("created allocation without material"))?;

        Ok(vec![AllocationEvent::StageAdvanced(StageAdvanced {
            allocation_id: cmd.allocation_id,
            material_id,
            from: self.state,
            to: cmd.to,
            carrier: cmd.carrier.clone(),
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record_withdrawal(
        &self,
        cmd: &RecordWithdrawal,
    ) -> Result<Vec<AllocationEvent>, DomainError> {
        self.ensure_open()?;

        if self.state != AllocationState::Delivered {
            return Err(DomainError::invalid_transition(format!(
                "withdrawal can only be recorded once delivered (allocation {} is {})",
                self.id,
                self.state.as_str()
            )));
        }
        if cmd.custodian.name.trim().is_empty() {
            return Err(DomainError::validation("custodian name cannot be empty"));
        }

        let material_id = self
            .material_id
            .ok_or_else(|| DomainError::invariant("created allocation without material"))?;

        Ok(vec![AllocationEvent::WithdrawalRecorded(
            WithdrawalRecorded {
                allocation_id: cmd.allocation_id,
                material_id,
                custodian: cmd.custodian.clone(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_return(&self, cmd: &Return) -> Result<Vec<AllocationEvent>, DomainError> {
        self.ensure_open()?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("returned quantity must be positive"));
        }

        let outstanding = self.quantity_outstanding();
        if cmd.quantity > outstanding {
            return Err(DomainError::validation(format!(
                "return of {} exceeds outstanding quantity {} (allocated {}, returned {})",
                cmd.quantity,
                outstanding,
                self.quantity_allocated(),
                self.quantity_returned
            )));
        }

        let serial = self.serial().cloned();
        if serial.is_some() {
            if cmd.quantity != 1 {
                return Err(DomainError::validation(
                    "a serial allocation returns exactly one unit",
                ));
            }
            if cmd.outcome == ReturnOutcome::Consumed {
                return Err(DomainError::validation(
                    "consumed outcome applies to quantity-controlled materials only",
                ));
            }
        }

        let material_id = self
            .material_id
            .ok_or_else(|| DomainError::invariant("created allocation without material"))?;

        Ok(vec![AllocationEvent::StockReturned(StockReturned {
            allocation_id: cmd.allocation_id,
            material_id,
            serial,
            outcome: cmd.outcome,
            quantity: cmd.quantity,
            closes_allocation: outstanding == cmd.quantity,
            actor: cmd.actor,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_cancel(&self, cmd: &Cancel) -> Result<Vec<AllocationEvent>, DomainError> {
        self.ensure_open()?;

        let material_id = self
            .material_id
            .ok_or_else(|| DomainError::invariant("created allocation without material"))?;

        Ok(vec![AllocationEvent::AllocationCancelled(
            AllocationCancelled {
                allocation_id: cmd.allocation_id,
                material_id,
                serial: self.serial().cloned(),
                quantity_outstanding: self.quantity_outstanding(),
                actor: cmd.actor,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
