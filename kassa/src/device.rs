//! High-level cash register interface

use std::time::Duration;

use bytes::Bytes;
use kassa_core::{Password, constants::DEFAULT_TIMEOUT};
use kassa_protocol::{Protocol, ProtocolV2, ProtocolV3, ProtocolVersion};
use kassa_transport::TcpTransport;
use kassa_types::{DeviceState, DeviceType};
use tracing::{debug, info, trace, warn};

use crate::chain::CommandChain;
use crate::command::{Command, DeviceStateRequest, DeviceTypeRequest, Outcome};
use crate::error::{Error, Result};

/// ATOL cash register
///
/// Owns a protocol engine and keeps the device in a known state: whenever a
/// command fails, the register clears the device's task queue and leaves
/// any open mode so the next command starts from mode selection.
///
/// # Examples
///
/// ```no_run
/// use kassa::CashRegister;
///
/// #[tokio::main]
/// async fn main() -> kassa::Result<()> {
///     let mut register = CashRegister::tcp("192.168.1.10", 5555);
///
///     let device = register.connect().await?;
///     println!("Connected to {}", device);
///
///     let state = register.device_state().await?;
///     println!("Shift open: {}", state.is_shift_open());
///
///     register.disconnect().await?;
///     Ok(())
/// }
/// ```
pub struct CashRegister {
    protocol: Box<dyn Protocol>,
    password: Password,
    timeout: Duration,
    device_type: Option<DeviceType>,
    connected: bool,
}

impl CashRegister {
    /// Create a register on top of a protocol engine
    pub fn new(protocol: impl Protocol + 'static) -> Self {
        Self {
            protocol: Box::new(protocol),
            password: Password::default(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT),
            device_type: None,
            connected: false,
        }
    }

    /// Create a register speaking the pipelined protocol over TCP
    pub fn tcp(addr: impl Into<String>, port: u16) -> Self {
        Self::new(ProtocolV3::new(TcpTransport::new(addr, port)))
    }

    /// Create a register speaking the legacy half-duplex protocol over TCP
    pub fn tcp_v2(addr: impl Into<String>, port: u16) -> Self {
        Self::new(ProtocolV2::new(TcpTransport::new(addr, port)))
    }

    /// Set how long a single command may wait for its answer
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the access password prefixed to every command (default: `00 00`)
    pub fn with_password(mut self, password: Password) -> Self {
        self.password = password;
        self
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol.version()
    }

    /// Device identification cached by [`CashRegister::connect`]
    pub fn device_type(&self) -> Option<&DeviceType> {
        self.device_type.as_ref()
    }

    /// Connect to the device
    ///
    /// Starts the protocol engine, returns the device to mode selection and
    /// reads its identification.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The connection cannot be established
    /// - The device does not answer the device type request
    ///
    /// The protocol is stopped again on error, so the register is left
    /// disconnected.
    pub async fn connect(&mut self) -> Result<DeviceType> {
        info!("Connecting over protocol {}...", self.protocol.version());

        self.protocol.start().await?;
        self.connected = true;

        if let Err(e) = self.resync().await {
            warn!("Initial resync failed: {}", e);
        }

        let device = match self.request_device_type().await {
            Ok(device) => device,
            Err(e) => {
                warn!("Device type request failed: {}", e);
                if let Err(stop_error) = self.disconnect().await {
                    warn!("Failed to stop protocol: {}", stop_error);
                }
                return Err(e);
            }
        };

        info!("Connected to {}", device);
        self.device_type = Some(device.clone());
        Ok(device)
    }

    async fn request_device_type(&self) -> Result<DeviceType> {
        Ok(self.execute(&DeviceTypeRequest).await?.into_data()?)
    }

    /// Disconnect from the device
    pub async fn disconnect(&mut self) -> Result<()> {
        if !self.connected {
            return Ok(());
        }

        info!("Disconnecting...");
        self.connected = false;
        self.device_type = None;
        self.protocol.stop().await?;

        info!("Disconnected");
        Ok(())
    }

    /// Execute a command
    ///
    /// A device-reported error triggers [`CashRegister::resync`]; the failed
    /// output is still returned unchanged. Resync failures are only logged.
    pub async fn execute<C: Command>(&self, command: &C) -> Result<C::Output> {
        let output = command.execute_on(self).await?;

        if output.has_error() {
            debug!("Command failed with {}, resynchronising", output.result());
            if let Err(e) = self.resync().await {
                warn!("Resync after failed command failed: {}", e);
            }
        }

        Ok(output)
    }

    /// Send a raw command and wait for the device's answer
    ///
    /// The access password is prefixed here. On timeout the task is
    /// cancelled in the engine.
    pub async fn execute_raw(&self, command: &[u8]) -> Result<Bytes> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        trace!("Executing command: {}", hex_preview(command));
        let completion = self.protocol.send(self.password.prefix(command)).await?;
        let task_id = completion.task_id();

        match tokio::time::timeout(self.timeout, completion).await {
            Ok(answer) => {
                let answer = answer?;
                trace!("Answer: {}", hex_preview(&answer));
                Ok(answer)
            }
            Err(_) => {
                if let Some(task_id) = task_id {
                    self.protocol.cancel(task_id);
                }
                warn!("No answer within {:?} (task {:?})", self.timeout, task_id);
                Err(Error::Timeout(self.timeout))
            }
        }
    }

    /// Clear the device's task queue
    pub async fn abort(&self) -> Result<()> {
        Ok(self.protocol.abort().await?)
    }

    /// Return the device to the mode selection state
    ///
    /// Clears the task queue, then leaves the current mode, cancelling an
    /// open bill first. If that fails the queue is cleared once more and the
    /// device is left as is.
    pub async fn resync(&self) -> Result<()> {
        debug!("Resynchronising device state");
        self.abort().await?;

        let state = match DeviceStateRequest.execute_on(self).await?.into_data() {
            Ok(state) => state,
            Err(e) => {
                warn!("Device state unavailable: {}", e);
                return self.abort().await;
            }
        };

        if state.is_selecting() {
            trace!("Device already in mode selection");
            return Ok(());
        }

        let mut chain = self.command();
        if state.has_open_bill() {
            chain = chain.cancel_bill();
        }
        chain = chain.reset_mode();
        if state.sub_mode != 0 {
            chain = chain.reset_mode();
        }

        let result = chain.run().await?;
        if result.has_error() {
            warn!(
                "Failed to leave mode {}.{}: {}",
                state.mode, state.sub_mode, result
            );
            self.abort().await?;
        }

        Ok(())
    }

    /// Read the current device state
    pub async fn device_state(&self) -> Result<DeviceState> {
        Ok(self.execute(&DeviceStateRequest).await?.into_data()?)
    }

    /// Start a command chain
    pub fn command(&self) -> CommandChain<'_> {
        CommandChain::new(self)
    }
}

impl Drop for CashRegister {
    fn drop(&mut self) {
        if self.connected {
            warn!("Cash register dropped while connected. Call disconnect() first.");
        }
    }
}

fn hex_preview(data: &[u8]) -> String {
    const LIMIT: usize = 32;
    if data.len() > LIMIT {
        format!("{}.. ({} bytes)", hex::encode(&data[..LIMIT]), data.len())
    } else {
        hex::encode(data)
    }
}
