//! Device commands

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use kassa_core::constants::{opcodes, NO_ERROR};
use kassa_types::{DeviceResult, DeviceState, DeviceType, Reply};

use crate::device::CashRegister;
use crate::error::{Error, Result};

/// Anything carrying a device result header
pub trait Outcome: Send {
    fn result(&self) -> DeviceResult;

    fn has_error(&self) -> bool {
        self.result().has_error()
    }
}

impl Outcome for DeviceResult {
    fn result(&self) -> DeviceResult {
        *self
    }
}

impl<T: Send> Outcome for Reply<T> {
    fn result(&self) -> DeviceResult {
        self.result
    }
}

/// Command executed against a [`CashRegister`]
///
/// Implementations talk to the device through
/// [`CashRegister::execute_raw`] and decode its answer. A device-reported
/// error is part of the output, not an `Err`.
#[async_trait]
pub trait Command: Send + Sync {
    type Output: Outcome;

    async fn execute_on(&self, register: &CashRegister) -> Result<Self::Output>;
}

/// Type-erased command, used as a chain step
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, register: &CashRegister) -> Result<DeviceResult>;
}

#[async_trait]
impl<C: Command> Step for C {
    async fn run(&self, register: &CashRegister) -> Result<DeviceResult> {
        Ok(self.execute_on(register).await?.result())
    }
}

/// Raw command whose answer is a bare result header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCommand {
    body: Bytes,
}

impl BasicCommand {
    /// Command from its opcode and arguments
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self { body: body.into() }
    }

    pub fn opcode(&self) -> Option<u8> {
        self.body.first().copied()
    }
}

#[async_trait]
impl Command for BasicCommand {
    type Output = DeviceResult;

    async fn execute_on(&self, register: &CashRegister) -> Result<DeviceResult> {
        let answer = register.execute_raw(&self.body).await?;
        Ok(DeviceResult::parse(&answer)?)
    }
}

/// Leave the current mode
#[derive(Debug, Clone, Copy, Default)]
pub struct ResetMode;

#[async_trait]
impl Command for ResetMode {
    type Output = DeviceResult;

    async fn execute_on(&self, register: &CashRegister) -> Result<DeviceResult> {
        BasicCommand::new(vec![opcodes::RESET_MODE])
            .execute_on(register)
            .await
    }
}

/// Cancel the open bill
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelBill;

#[async_trait]
impl Command for CancelBill {
    type Output = DeviceResult;

    async fn execute_on(&self, register: &CashRegister) -> Result<DeviceResult> {
        BasicCommand::new(vec![opcodes::CANCEL_BILL])
            .execute_on(register)
            .await
    }
}

/// Pause without talking to the device
#[derive(Debug, Clone, Copy)]
pub struct Wait(pub Duration);

#[async_trait]
impl Command for Wait {
    type Output = DeviceResult;

    async fn execute_on(&self, _register: &CashRegister) -> Result<DeviceResult> {
        tokio::time::sleep(self.0).await;
        Ok(DeviceResult::success())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceStateRequest;

#[async_trait]
impl Command for DeviceStateRequest {
    type Output = Reply<DeviceState>;

    async fn execute_on(&self, register: &CashRegister) -> Result<Reply<DeviceState>> {
        let answer = register.execute_raw(&[opcodes::DEVICE_STATE]).await?;
        decode(&answer, DeviceState::parse)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceTypeRequest;

#[async_trait]
impl Command for DeviceTypeRequest {
    type Output = Reply<DeviceType>;

    async fn execute_on(&self, register: &CashRegister) -> Result<Reply<DeviceType>> {
        let answer = register.execute_raw(&[opcodes::DEVICE_TYPE]).await?;
        decode(&answer, DeviceType::parse)
    }
}

/// Turn a parser's device error into a failed reply
fn decode<T>(
    answer: &[u8],
    parse: impl FnOnce(&[u8]) -> kassa_types::Result<T>,
) -> Result<Reply<T>> {
    match parse(answer) {
        Ok(data) => {
            let response_code = answer.first().copied().unwrap_or_default();
            Ok(Reply::ok(
                DeviceResult::new(response_code, NO_ERROR, NO_ERROR),
                data,
            ))
        }
        Err(kassa_types::Error::Device(result)) => Ok(Reply::failed(result)),
        Err(e) => Err(Error::Types(e)),
    }
}
