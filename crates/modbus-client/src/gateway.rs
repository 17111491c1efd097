use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tokio_modbus::prelude::{Reader, Slave, SlaveContext, Writer};

use crate::circuit::CircuitBreaker;
use crate::error::GatewayError;
use crate::framer::{self, Transport};
use types::{CacheValue, Framer, RegisterType};

/// Read/write parameters that come from whichever `DeviceConfig` last
/// touched this gateway. Gateways are shared by every device at the same
/// (host, port); the manager passes the caller's own timeout/retry values
/// on each request rather than the gateway owning one fixed policy.
#[derive(Debug, Clone, Copy)]
pub struct RequestPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
}

/// One physical (host, port) transport, serialized behind a single lock
/// because multiple logical devices can share the same RS-485 bus.
pub struct Gateway {
    host: String,
    port: u16,
    framer: Framer,
    transport: Mutex<Option<Transport>>,
    breaker: CircuitBreaker,
}

impl Gateway {
    pub fn new(
        host: String,
        port: u16,
        framer: Framer,
        circuit_failure_threshold: u32,
        circuit_recovery_timeout: Duration,
    ) -> Self {
        Self {
            host,
            port,
            framer,
            transport: Mutex::new(None),
            breaker: CircuitBreaker::new(circuit_failure_threshold, circuit_recovery_timeout),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn is_circuit_open(&self) -> bool {
        self.breaker.is_open().await
    }

    pub async fn circuit_retry_after_seconds(&self) -> Option<u64> {
        self.breaker.retry_after_seconds().await
    }

    /// Idempotent teardown; the next `read`/`write` reopens lazily.
    pub async fn close(&self) {
        let mut guard = self.transport.lock().await;
        *guard = None;
    }

    async fn ensure_connected(
        &self,
        guard: &mut Option<Transport>,
        connect_timeout: Duration,
    ) -> Result<(), GatewayError> {
        if guard.is_some() {
            return Ok(());
        }
        let transport = framer::connect(self.framer, &self.host, self.port, connect_timeout).await?;
        *guard = Some(transport);
        Ok(())
    }

    pub async fn read(
        &self,
        slave_id: u8,
        register_type: RegisterType,
        address: u16,
        count: u16,
        policy: RequestPolicy,
    ) -> Result<CacheValue, GatewayError> {
        self.breaker.check().await?;
        let mut attempts = 0u32;
        let mut last_error;

        loop {
            let outcome = self.try_read(slave_id, register_type, address, count, policy).await;
            match outcome {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(err) if !err.is_transport() => {
                    return Err(err);
                }
                Err(err) => {
                    last_error = err;
                }
            }

            if attempts >= policy.max_retries {
                self.breaker.record_failure().await;
                return Err(last_error);
            }
            self.close().await;
            attempts += 1;
            sleep(policy.retry_delay).await;
        }
    }

    async fn try_read(
        &self,
        slave_id: u8,
        register_type: RegisterType,
        address: u16,
        count: u16,
        policy: RequestPolicy,
    ) -> Result<CacheValue, GatewayError> {
        let mut guard = self.transport.lock().await;
        self.ensure_connected(&mut guard, policy.timeout).await?;

        let result = timeout(
            policy.timeout,
            read_from_transport(guard.as_mut().expect("just connected"), slave_id, register_type, address, count),
        )
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                *guard = None;
                Err(GatewayError::Timeout {
                    timeout_ms: policy.timeout.as_millis() as u64,
                })
            }
        }
    }

    pub async fn write(
        &self,
        slave_id: u8,
        register_type: RegisterType,
        address: u16,
        value: u16,
        policy: RequestPolicy,
    ) -> Result<(), GatewayError> {
        if !register_type.is_writable() {
            return Err(GatewayError::NotWritable(register_type.to_string()));
        }
        self.breaker.check().await?;
        let mut attempts = 0u32;
        let mut last_error;

        loop {
            let outcome = self.try_write(slave_id, register_type, address, value, policy).await;
            match outcome {
                Ok(()) => {
                    self.breaker.record_success().await;
                    return Ok(());
                }
                Err(err) if !err.is_transport() => {
                    return Err(err);
                }
                Err(err) => {
                    last_error = err;
                }
            }

            if attempts >= policy.max_retries {
                self.breaker.record_failure().await;
                return Err(last_error);
            }
            self.close().await;
            attempts += 1;
            sleep(policy.retry_delay).await;
        }
    }

    async fn try_write(
        &self,
        slave_id: u8,
        register_type: RegisterType,
        address: u16,
        value: u16,
        policy: RequestPolicy,
    ) -> Result<(), GatewayError> {
        let mut guard = self.transport.lock().await;
        self.ensure_connected(&mut guard, policy.timeout).await?;

        let result = timeout(
            policy.timeout,
            write_to_transport(guard.as_mut().expect("just connected"), slave_id, register_type, address, value),
        )
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => {
                *guard = None;
                Err(GatewayError::Timeout {
                    timeout_ms: policy.timeout.as_millis() as u64,
                })
            }
        }
    }
}

async fn read_from_transport(
    transport: &mut Transport,
    slave_id: u8,
    register_type: RegisterType,
    address: u16,
    count: u16,
) -> Result<CacheValue, GatewayError> {
    match transport {
        Transport::Modbus(ctx) => {
            ctx.set_slave(Slave(slave_id));
            match register_type {
                RegisterType::Holding => {
                    let values = ctx
                        .read_holding_registers(address, count)
                        .await
                        .map_err(map_modbus_io_error)?
                        .map_err(map_modbus_exception)?;
                    Ok(CacheValue::Registers(values))
                }
                RegisterType::Input => {
                    let values = ctx
                        .read_input_registers(address, count)
                        .await
                        .map_err(map_modbus_io_error)?
                        .map_err(map_modbus_exception)?;
                    Ok(CacheValue::Registers(values))
                }
                RegisterType::Coil => {
                    let values = ctx
                        .read_coils(address, count)
                        .await
                        .map_err(map_modbus_io_error)?
                        .map_err(map_modbus_exception)?;
                    Ok(CacheValue::Bits(values))
                }
                RegisterType::Discrete => {
                    let values = ctx
                        .read_discrete_inputs(address, count)
                        .await
                        .map_err(map_modbus_io_error)?
                        .map_err(map_modbus_exception)?;
                    Ok(CacheValue::Bits(values))
                }
            }
        }
        Transport::Ascii(ascii) => {
            let function = match register_type {
                RegisterType::Coil => 0x01,
                RegisterType::Discrete => 0x02,
                RegisterType::Holding => 0x03,
                RegisterType::Input => 0x04,
            };
            let payload = ascii.read_registers(slave_id, function, address, count).await?;
            decode_ascii_read(register_type, count, &payload)
        }
    }
}

async fn write_to_transport(
    transport: &mut Transport,
    slave_id: u8,
    register_type: RegisterType,
    address: u16,
    value: u16,
) -> Result<(), GatewayError> {
    match transport {
        Transport::Modbus(ctx) => {
            ctx.set_slave(Slave(slave_id));
            match register_type {
                RegisterType::Holding => ctx
                    .write_single_register(address, value)
                    .await
                    .map_err(map_modbus_io_error)?
                    .map_err(map_modbus_exception),
                RegisterType::Coil => ctx
                    .write_single_coil(address, value != 0)
                    .await
                    .map_err(map_modbus_io_error)?
                    .map_err(map_modbus_exception),
                _ => unreachable!("validated writable upstream"),
            }
        }
        Transport::Ascii(ascii) => {
            let function = match register_type {
                RegisterType::Holding => 0x06,
                RegisterType::Coil => 0x05,
                _ => unreachable!("validated writable upstream"),
            };
            let ascii_value = if register_type == RegisterType::Coil {
                if value != 0 {
                    0xFF00
                } else {
                    0x0000
                }
            } else {
                value
            };
            ascii
                .write_single(slave_id, function, address, ascii_value)
                .await?;
            Ok(())
        }
    }
}

fn decode_ascii_read(
    register_type: RegisterType,
    count: u16,
    payload: &[u8],
) -> Result<CacheValue, GatewayError> {
    // payload = [function, byte_count, data...]
    let data = payload
        .get(2..)
        .ok_or_else(|| GatewayError::Transport("short ASCII payload".to_string()))?;
    if register_type.is_bit_space() {
        let mut bits = Vec::with_capacity(count as usize);
        for i in 0..count as usize {
            let byte = data.get(i / 8).copied().unwrap_or(0);
            bits.push(byte & (1 << (i % 8)) != 0);
        }
        Ok(CacheValue::Bits(bits))
    } else {
        let mut registers = Vec::with_capacity(count as usize);
        for chunk in data.chunks(2).take(count as usize) {
            if chunk.len() < 2 {
                break;
            }
            registers.push(u16::from_be_bytes([chunk[0], chunk[1]]));
        }
        Ok(CacheValue::Registers(registers))
    }
}

fn map_modbus_io_error(err: std::io::Error) -> GatewayError {
    GatewayError::Transport(err.to_string())
}

fn map_modbus_exception(err: tokio_modbus::ExceptionCode) -> GatewayError {
    GatewayError::ModbusException {
        detail: err.to_string(),
        code: Some(err as i32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_ascii_registers() {
        // function=0x03, byte_count=4, reg0=0x0102, reg1=0x0304
        let payload = vec![0x03, 0x04, 0x01, 0x02, 0x03, 0x04];
        let value = decode_ascii_read(RegisterType::Holding, 2, &payload).unwrap();
        assert_eq!(value, CacheValue::Registers(vec![0x0102, 0x0304]));
    }

    #[test]
    fn decode_ascii_bits() {
        let payload = vec![0x01, 0x01, 0b0000_0101];
        let value = decode_ascii_read(RegisterType::Coil, 3, &payload).unwrap();
        assert_eq!(value, CacheValue::Bits(vec![true, false, true]));
    }
}
