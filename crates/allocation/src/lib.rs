//! Allocation lifecycle state machine.
//!
//! This crate contains the business rules for bindings between stock and an
//! external consumer, implemented purely as deterministic domain logic (no
//! IO, no locking, no storage). The single transition function is
//! [`Allocation::handle`]; every counter effect of a transition is expressed
//! as [`CounterDeltas`] on the produced event and applied elsewhere by the
//! reconciliation ledger.

pub mod allocation;

pub use allocation::{
    Advance, Allocation, AllocationCancelled, AllocationCommand, AllocationEvent, AllocationId,
    AllocationState, Cancel, CarrierInfo, CounterDeltas, Custodian, CustodyRecord,
    RecordWithdrawal, Reserve, ReserveSerial, Return, ReturnOutcome, SerialReserved,
    SerialTransition, ShippingMode, StageAdvanced, StockRef, StockReserved, StockReturned,
    WithdrawalRecorded,
};
