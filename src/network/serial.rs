use async_trait::async_trait;
use tokio::io::{ReadHalf, WriteHalf};
use tokio_serial::{
    DataBits, FlowControl, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits,
};
use tracing::info;

use crate::network::{Connection, EndpointDescriptor, StreamConnection};
use crate::AppResult;

/// A full-duplex serial device mapped onto the connection contract.
///
/// Line settings are fixed at 8N1 without flow control, with DTR and RTS
/// asserted.
pub struct SerialConnection {
    inner: StreamConnection<ReadHalf<SerialStream>, WriteHalf<SerialStream>>,
}

impl SerialConnection {
    pub fn open(port_name: &str, baud_rate: u32) -> AppResult<SerialConnection> {
        let mut port = tokio_serial::new(port_name, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .open_native_async()?;
        port.write_data_terminal_ready(true)?;
        port.write_request_to_send(true)?;

        info!("serial: opened device={} baud_rate={}", port_name, baud_rate);

        let remote = EndpointDescriptor::Serial {
            port_name: port_name.to_string(),
            baud_rate,
        };
        let (reader, writer) = tokio::io::split(port);
        Ok(SerialConnection {
            inner: StreamConnection::new(reader, writer, remote),
        })
    }
}

#[async_trait]
impl Connection for SerialConnection {
    fn remote_identity(&self) -> &EndpointDescriptor {
        self.inner.remote_identity()
    }

    async fn send(&self, data: &[u8]) -> AppResult<()> {
        self.inner.send(data).await
    }

    async fn receive(&self, buf: &mut [u8]) -> AppResult<usize> {
        self.inner.receive(buf).await
    }

    async fn close(&self) -> AppResult<()> {
        self.inner.close().await
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}
