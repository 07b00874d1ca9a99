//! Newline-delimited JSON bridge to the OpenFlow framework shim.
//!
//! The shim connects over TCP, writes one [`ControllerEvent`] per line and
//! reads back one [`SwitchCommand`] per line. Connections are served one at a
//! time; commands produced while no shim is connected wait in the queue.

use log::{debug, error, info, warn};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::messages::{ControllerEvent, SwitchCommand};

pub struct EventServer {
    listener: TcpListener,
    events: mpsc::Sender<ControllerEvent>,
    commands: mpsc::UnboundedReceiver<SwitchCommand>,
}

impl EventServer {
    pub async fn bind(
        addr: &str,
        events: mpsc::Sender<ControllerEvent>,
        commands: mpsc::UnboundedReceiver<SwitchCommand>,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Event bridge listening on {}", listener.local_addr()?);
        Ok(Self { listener, events, commands })
    }

    pub fn local_addr(&self) -> anyhow::Result<std::net::SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(mut self) -> anyhow::Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    info!("Framework connection from {}", addr);
                    match Self::handle_client(stream, &self.events, &mut self.commands).await {
                        Ok(true) => info!("Framework connection {} closed", addr),
                        Ok(false) => {
                            info!("Controller stopped, closing event bridge");
                            return Ok(());
                        }
                        Err(e) => error!("Error handling framework connection {}: {}", addr, e),
                    }
                }
                Err(e) => {
                    error!("Failed to accept framework connection: {}", e);
                }
            }
        }
    }

    /// Returns `Ok(false)` once the controller side has gone away.
    async fn handle_client(
        mut stream: TcpStream,
        events: &mpsc::Sender<ControllerEvent>,
        commands: &mut mpsc::UnboundedReceiver<SwitchCommand>,
    ) -> anyhow::Result<bool> {
        let (reader, mut writer) = stream.split();
        let mut lines = BufReader::new(reader).lines();

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Some(line) = line? else {
                        return Ok(true);
                    };
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match serde_json::from_str::<ControllerEvent>(trimmed) {
                        Ok(event) => {
                            if events.send(event).await.is_err() {
                                return Ok(false);
                            }
                        }
                        Err(e) => warn!("Invalid event line: {}", e),
                    }
                }
                command = commands.recv() => {
                    let Some(command) = command else {
                        return Ok(false);
                    };
                    debug!("Sending {} command to switch {}", command_name(&command), command.dpid());
                    let mut json = serde_json::to_string(&command)?;
                    json.push('\n');
                    writer.write_all(json.as_bytes()).await?;
                    writer.flush().await?;
                }
            }
        }
    }
}

fn command_name(command: &SwitchCommand) -> &'static str {
    match command {
        SwitchCommand::InstallFlow { .. } => "install_flow",
        SwitchCommand::PacketOut { .. } => "packet_out",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::OutputPort;

    #[tokio::test]
    async fn relays_events_and_commands() {
        let (event_tx, mut event_rx) = mpsc::channel(8);
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let server = EventServer::bind("127.0.0.1:0", event_tx, command_rx).await.unwrap();
        let addr = server.local_addr().unwrap();
        let server = tokio::spawn(server.run());

        let mut client = TcpStream::connect(addr).await.unwrap();
        client
            .write_all(b"{\"event\":\"switch_connected\",\"dpid\":1}\nnot json\n\n")
            .await
            .unwrap();
        assert_eq!(event_rx.recv().await, Some(ControllerEvent::SwitchConnected { dpid: 1 }));

        command_tx
            .send(SwitchCommand::PacketOut { dpid: 1, in_port: 2, output: OutputPort::Flood, frame: vec![1, 2] })
            .unwrap();
        let (reader, _writer) = client.split();
        let mut lines = BufReader::new(reader).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        let command: SwitchCommand = serde_json::from_str(&line).unwrap();
        assert_eq!(command.dpid(), 1);
        assert_eq!(command_name(&command), "packet_out");

        server.abort();
    }

    #[test]
    fn command_names_match_wire_tags() {
        let flow = SwitchCommand::InstallFlow {
            dpid: 3,
            rule: crate::messages::FlowRule {
                matcher: crate::messages::FlowMatch::icmp(),
                priority: 1,
                output: OutputPort::Controller,
                idle_timeout: 0,
                hard_timeout: 0,
            },
        };
        let json = serde_json::to_value(&flow).unwrap();
        assert_eq!(json["command"], command_name(&flow));
        assert_eq!(format!("{}", command_name(&flow)), "install_flow");
    }
}
