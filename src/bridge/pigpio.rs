//! Minimal client for the pigpio daemon (`sudo pigpiod`) socket interface.
//!
//! Every request is four little-endian `u32` words: command, p1, p2 and the
//! length of an (unused here) extension block. The daemon answers with the
//! first three words echoed and a signed result in the fourth, negative
//! values being pigpio error codes.

use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info};
use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::light::LightDriver;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 8888;

const CMD_PWM: u32 = 5;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const IO_TIMEOUT: Duration = Duration::from_secs(5);

pub struct PigpioClient {
    stream: Option<TcpStream>,
    addr: SocketAddr,
}

impl PigpioClient {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .with_context(|| format!("failed to resolve pigpio daemon address {host}:{port}"))?
            .collect();

        let mut last_err = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(IO_TIMEOUT))?;
                    stream.set_write_timeout(Some(IO_TIMEOUT))?;
                    stream.set_nodelay(true)?;
                    info!("connected to pigpio daemon at {addr}");
                    return Ok(Self {
                        stream: Some(stream),
                        addr,
                    });
                }
                Err(err) => last_err = Some(err),
            }
        }

        Err(match last_err {
            Some(err) => anyhow!(err),
            None => anyhow!("no addresses for {host}:{port}"),
        })
        .with_context(|| {
            format!("can't connect to pigpio daemon at {host}:{port}, is 'sudo pigpiod' running?")
        })
    }

    fn command(&mut self, cmd: u32, p1: u32, p2: u32) -> Result<i32> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("pigpio connection to {} already closed", self.addr))?;

        let mut request = [0u8; 16];
        request[0..4].copy_from_slice(&cmd.to_le_bytes());
        request[4..8].copy_from_slice(&p1.to_le_bytes());
        request[8..12].copy_from_slice(&p2.to_le_bytes());
        stream
            .write_all(&request)
            .with_context(|| format!("failed to send pigpio command {cmd}"))?;

        let mut reply = [0u8; 16];
        stream
            .read_exact(&mut reply)
            .with_context(|| format!("no reply to pigpio command {cmd}"))?;

        let echoed = u32::from_le_bytes([reply[0], reply[1], reply[2], reply[3]]);
        if echoed != cmd {
            bail!("pigpio replied to command {echoed}, expected {cmd}");
        }
        let result = i32::from_le_bytes([reply[12], reply[13], reply[14], reply[15]]);
        if result < 0 {
            bail!("pigpio command {cmd} failed with error {result}");
        }
        Ok(result)
    }
}

impl LightDriver for PigpioClient {
    fn set_duty_cycle(&mut self, channel: u32, value: u8) -> Result<()> {
        debug!("pigpio PWM gpio={channel} dutycycle={value}");
        self.command(CMD_PWM, channel, u32::from(value)).map(|_| ())
    }

    fn release(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream
                .shutdown(Shutdown::Both)
                .context("failed to close pigpio connection")?;
            info!("pigpio connection to {} closed", self.addr);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    /// Accepts one client and answers each request with `result`, returning
    /// the requests it saw once the client hangs up.
    fn fake_daemon(result: i32) -> (u16, thread::JoinHandle<Vec<[u32; 4]>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut seen = Vec::new();
            let mut request = [0u8; 16];
            while socket.read_exact(&mut request).is_ok() {
                let word = |i: usize| {
                    u32::from_le_bytes(request[i * 4..i * 4 + 4].try_into().unwrap())
                };
                seen.push([word(0), word(1), word(2), word(3)]);

                let mut reply = request;
                reply[12..16].copy_from_slice(&result.to_le_bytes());
                socket.write_all(&reply).unwrap();
            }
            seen
        });

        (port, handle)
    }

    #[test]
    fn duty_cycle_is_sent_as_pwm_command() {
        let (port, daemon) = fake_daemon(0);
        let mut client = PigpioClient::connect("127.0.0.1", port).unwrap();

        client.set_duty_cycle(17, 200).unwrap();
        client.set_duty_cycle(17, 0).unwrap();
        client.release().unwrap();

        let seen = daemon.join().unwrap();
        assert_eq!(seen, vec![[5, 17, 200, 0], [5, 17, 0, 0]]);
    }

    #[test]
    fn negative_result_is_an_error() {
        let (port, daemon) = fake_daemon(-2);
        let mut client = PigpioClient::connect("127.0.0.1", port).unwrap();

        let err = client.set_duty_cycle(99, 50).unwrap_err();
        assert!(err.to_string().contains("error -2"));

        client.release().unwrap();
        daemon.join().unwrap();
    }

    #[test]
    fn commands_after_release_fail() {
        let (port, daemon) = fake_daemon(0);
        let mut client = PigpioClient::connect("127.0.0.1", port).unwrap();
        client.release().unwrap();
        client.release().unwrap();

        assert!(client.set_duty_cycle(17, 10).is_err());
        daemon.join().unwrap();
    }

    #[test]
    fn unreachable_daemon_is_reported() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let err = PigpioClient::connect("127.0.0.1", port).err().unwrap();
        assert!(format!("{err:#}").contains("pigpiod"));
    }
}
