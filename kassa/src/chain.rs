//! Command chains

use std::fmt;
use std::time::Duration;

use kassa_types::DeviceResult;
use tracing::{debug, warn};

use crate::command::{CancelBill, Command, ResetMode, Step, Wait};
use crate::device::CashRegister;
use crate::error::Result;

/// Ordered list of commands executed as one unit
///
/// Steps run left to right. The first device-reported error stops the chain
/// and becomes its result. Afterwards [`CommandChain::execute`] returns the
/// device to the mode selection state once, whatever the outcome.
///
/// ```no_run
/// # async fn demo(register: &kassa::CashRegister) -> kassa::Result<()> {
/// use std::time::Duration;
///
/// let result = register
///     .command()
///     .cancel_bill()
///     .sleep(Duration::from_millis(200))
///     .reset_mode()
///     .execute()
///     .await?;
/// println!("{}", result);
/// # Ok(())
/// # }
/// ```
pub struct CommandChain<'a> {
    register: &'a CashRegister,
    steps: Vec<Box<dyn Step + 'a>>,
}

impl<'a> CommandChain<'a> {
    pub fn new(register: &'a CashRegister) -> Self {
        Self {
            register,
            steps: Vec::new(),
        }
    }

    pub fn append(mut self, command: impl Command + 'a) -> Self {
        self.steps.push(Box::new(command));
        self
    }

    pub fn cancel_bill(self) -> Self {
        self.append(CancelBill)
    }

    pub fn reset_mode(self) -> Self {
        self.append(ResetMode)
    }

    pub fn sleep(self, duration: Duration) -> Self {
        self.append(Wait(duration))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run the steps without resynchronising afterwards
    ///
    /// An empty chain yields [`DeviceResult::success`].
    pub async fn run(&self) -> Result<DeviceResult> {
        let mut result = DeviceResult::success();

        for (index, step) in self.steps.iter().enumerate() {
            result = step.run(self.register).await?;
            if result.has_error() {
                debug!(
                    "Chain step {} failed with {}, skipping {} remaining",
                    index,
                    result,
                    self.steps.len() - index - 1
                );
                break;
            }
        }

        Ok(result)
    }

    /// Run the steps, then resynchronise the device
    ///
    /// Resync failures are logged; the chain's own result is returned.
    /// A transport or protocol fault aborts the chain with `Err` and skips
    /// the resync.
    pub async fn execute(self) -> Result<DeviceResult> {
        let result = self.run().await?;

        if let Err(e) = self.register.resync().await {
            warn!("Resync after command chain failed: {}", e);
        }

        Ok(result)
    }
}

impl fmt::Debug for CommandChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandChain")
            .field("steps", &self.steps.len())
            .finish()
    }
}
