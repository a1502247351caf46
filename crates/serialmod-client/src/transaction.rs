//! One request/response exchange on a line already granted to the caller.

use crate::config::RetryPolicy;
use crate::error::ClientError;
use serialmod_core::frame::ascii;
use serialmod_core::pdu::{FunctionCode, Response};
use serialmod_core::{BROADCAST_ADDRESS, DecodeError, FramingMode};
use serialmod_datalink::{FrameBoundary, SerialChannel};
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Pending,
    AwaitingResponse,
    RetryScheduled,
    Succeeded,
    Failed,
}

/// A validated normal response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModbusResponse {
    pub slave_address: u8,
    pub function_code: FunctionCode,
    /// Response data after the function code. Empty for broadcasts.
    pub payload: Vec<u8>,
}

/// Drives an encoded request through write, read, validate and retry.
///
/// The frame is encoded by the caller once; every attempt resends the same
/// bytes.
#[derive(Debug)]
pub struct Transaction<'a> {
    slave: u8,
    function_code: FunctionCode,
    frame: &'a [u8],
    policy: RetryPolicy,
    attempts: u8,
    deadline: Option<Instant>,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    pub fn new(
        slave: u8,
        function_code: FunctionCode,
        frame: &'a [u8],
        policy: RetryPolicy,
    ) -> Self {
        Self {
            slave,
            function_code,
            frame,
            policy,
            attempts: 0,
            deadline: None,
            state: TransactionState::Pending,
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Attempts made so far.
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// When the current attempt stops waiting for a response.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub async fn run<C>(&mut self, channel: &mut C) -> Result<ModbusResponse, ClientError>
    where
        C: SerialChannel + ?Sized,
    {
        let result = self.drive(channel).await;
        self.state = if result.is_ok() {
            TransactionState::Succeeded
        } else {
            TransactionState::Failed
        };
        result
    }

    async fn drive<C>(&mut self, channel: &mut C) -> Result<ModbusResponse, ClientError>
    where
        C: SerialChannel + ?Sized,
    {
        let function = self.function_code.as_u8();
        let stale = channel.discard_input().await?;
        if stale > 0 {
            debug!(slave = self.slave, stale, "discarded stale input before request");
        }

        if self.slave == BROADCAST_ADDRESS {
            self.attempts = 1;
            self.send(channel).await?;
            sleep(self.policy.turnaround_delay).await;
            debug!(function, "modbus broadcast sent");
            return Ok(ModbusResponse {
                slave_address: BROADCAST_ADDRESS,
                function_code: self.function_code,
                payload: Vec::new(),
            });
        }

        loop {
            self.attempts += 1;
            self.state = TransactionState::AwaitingResponse;
            let err = match self.attempt(channel).await {
                Ok(response) => {
                    debug!(
                        slave = self.slave,
                        function,
                        attempt = self.attempts,
                        len = response.payload.len(),
                        "modbus request succeeded"
                    );
                    return Ok(response);
                }
                Err(err) if err.is_retryable() => err,
                Err(err) => return Err(err),
            };

            if self.attempts >= self.policy.attempts {
                warn!(
                    slave = self.slave,
                    function,
                    attempts = self.attempts,
                    error = %err,
                    "modbus request failed, retries exhausted"
                );
                return Err(ClientError::RetriesExhausted {
                    attempts: self.attempts,
                    last: Box::new(err),
                });
            }

            self.state = TransactionState::RetryScheduled;
            let delay = self.policy.backoff.delay(u32::from(self.attempts));
            warn!(
                slave = self.slave,
                function,
                attempt = self.attempts,
                error = %err,
                ?delay,
                "retrying modbus request"
            );
            if !delay.is_zero() {
                sleep(delay).await;
            }
            // A late reply to the failed attempt must not answer the next one.
            channel.discard_input().await?;
        }
    }

    async fn attempt<C>(&mut self, channel: &mut C) -> Result<ModbusResponse, ClientError>
    where
        C: SerialChannel + ?Sized,
    {
        self.send(channel).await?;
        self.deadline = Some(Instant::now() + self.policy.timeout);
        let boundary = FrameBoundary::for_framing(self.policy.framing, self.policy.quiet_threshold);
        let frame = channel.read_frame(boundary, self.policy.timeout).await?;
        decode_response(self.policy.framing, &frame, self.slave, self.function_code)
    }

    /// Writes the request, giving up once the response timeout elapses.
    ///
    /// A peer that stops draining the line would otherwise hold the grant forever.
    async fn send<C>(&self, channel: &mut C) -> Result<(), ClientError>
    where
        C: SerialChannel + ?Sized,
    {
        match tokio::time::timeout(self.policy.timeout, channel.write(self.frame)).await {
            Ok(result) => Ok(result?),
            Err(_) => {
                debug!(slave = self.slave, len = self.frame.len(), "request write stalled");
                Err(ClientError::Timeout)
            }
        }
    }
}

/// Validates a received frame against the request that prompted it.
///
/// Anything that is not a well-formed answer from `slave` to `function_code`
/// is an error; exception responses come back as [`ClientError::Exception`].
pub fn decode_response(
    framing: FramingMode,
    frame: &[u8],
    slave: u8,
    function_code: FunctionCode,
) -> Result<ModbusResponse, ClientError> {
    let mut scratch = [0u8; ascii::MAX_DECODED_LEN];
    let (address, pdu) = framing.decode(frame, &mut scratch)?;
    if address != slave {
        return Err(ClientError::UnexpectedResponse("response from another slave"));
    }
    match Response::decode(pdu)? {
        Response::Exception(exception) if exception.function_code == function_code.as_u8() => {
            Err(ClientError::Exception(exception))
        }
        Response::Exception(_) => Err(ClientError::UnexpectedResponse(
            "exception for another function",
        )),
        Response::Data {
            function_code: received,
            ..
        } if received.as_u8() != function_code.as_u8() => {
            Err(ClientError::UnexpectedResponse("function code mismatch"))
        }
        Response::Data { data, .. } => {
            if !function_code.expected_response().matches(data) {
                return Err(ClientError::Framing(DecodeError::InvalidLength));
            }
            Ok(ModbusResponse {
                slave_address: address,
                function_code,
                payload: data.to_vec(),
            })
        }
    }
}
