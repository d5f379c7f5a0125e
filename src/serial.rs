//! Serial-port backed sensor stream.
use std::time::Duration;
use log::info;
use serialport::{SerialPort, SerialPortInfo, SerialPortType};
use crate::pipeline::{LineReader, SensorStream, StreamError};
/// Exclusive handle on the sensor's serial connection.
///
/// Reads wait at most the timeout given to [`SerialStream::open`]. The port
/// is released by [`SensorStream::close`] or when the handle is dropped.
pub struct SerialStream {
    port_name: String,
    baud_rate: u32,
    reader: Option<LineReader<Box<dyn SerialPort>>>,
}
impl SerialStream {
    pub fn open(port_name: &str, baud_rate: u32, timeout: Duration) -> Result<Self, StreamError> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(timeout)
            .open()
            .map_err(|source| StreamError::Open {
                port: port_name.to_owned(),
                source,
            })?;
        info!("Opened serial port {port_name} at {baud_rate} baud");
        Ok(Self {
            port_name: port_name.to_owned(),
            baud_rate,
            reader: Some(LineReader::new(port)),
        })
    }
}
impl SensorStream for SerialStream {
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, StreamError> {
        let reader = self.reader.as_mut().ok_or(StreamError::Closed)?;
        Ok(reader.read_line()?)
    }
    fn close(&mut self) -> Result<(), StreamError> {
        if self.reader.take().is_some() {
            info!("Closed serial port {}", self.port_name);
        }
        Ok(())
    }
    fn describe(&self) -> String {
        format!("serial port {} ({} baud)", self.port_name, self.baud_rate)
    }
}
/// Ports the OS currently exposes, with a short description of each.
pub fn list_ports() -> Result<Vec<(String, String)>, StreamError> {
    let ports = serialport::available_ports().map_err(StreamError::Enumerate)?;
    Ok(ports.into_iter().map(describe_port).collect())
}
fn describe_port(info: SerialPortInfo) -> (String, String) {
    let kind = match info.port_type {
        SerialPortType::UsbPort(usb) => {
            let product = usb.product.unwrap_or_else(|| "USB serial".to_owned());
            format!("{product} [{:04x}:{:04x}]", usb.vid, usb.pid)
        }
        SerialPortType::PciPort => "PCI".to_owned(),
        SerialPortType::BluetoothPort => "Bluetooth".to_owned(),
        SerialPortType::Unknown => "unknown".to_owned(),
    };
    (info.port_name, kind)
}
