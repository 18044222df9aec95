use async_trait::async_trait;
use uuid::Uuid;

use super::{Transport, TransportError};
use crate::core::store::Server;

const FILE_LISTING: &str = "
file1.txt
file2.txt
directory1/
directory2/
config.json
README.md
";

const PROCESS_TABLE: &str = "
PID   COMMAND
1     system
100   mcp_server
200   database
300   web_server
";

/// In-process stand-in for a real server connection. Output is shaped by the command prefix.
#[derive(Debug, Default, Clone)]
pub struct SimulatedTransport;

impl SimulatedTransport {
    pub fn new() -> Self {
        Self
    }

    fn respond(server: &Server, command: &str) -> String {
        let lowered = command.to_lowercase();
        let argument = command.split_once(' ').map(|(_, rest)| rest);

        if lowered.starts_with("ls") || lowered.starts_with("dir") {
            FILE_LISTING.to_string()
        } else if lowered.starts_with("cat") || lowered.starts_with("type") {
            let file = argument.unwrap_or("unknown");
            format!(
                "Contents of {file}:\nThis is a mock file content for demonstration purposes.\nLine 2 of the file.\nLine 3 of the file."
            )
        } else if lowered.starts_with("ps") || lowered.starts_with("tasklist") {
            PROCESS_TABLE.to_string()
        } else if lowered.starts_with("ping") {
            ping_report(argument.unwrap_or("localhost"))
        } else {
            format!(
                "Executed command '{}' on {} (mock execution)",
                command, server.name
            )
        }
    }
}

fn ping_report(host: &str) -> String {
    let mut out = format!("\nPinging {host} with 32 bytes of data:\n");
    for ms in [10, 12, 9, 11] {
        out.push_str(&format!("Reply from {host}: bytes=32 time={ms}ms TTL=64\n"));
    }
    out.push_str(&format!(
        "\nPing statistics for {host}:\n    Packets: Sent = 4, Received = 4, Lost = 0 (0% loss),\n\
         Approximate round trip times in milli-seconds:\n    Minimum = 9ms, Maximum = 12ms, Average = 10.5ms\n"
    ));
    out
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn open(&self, _server: &Server) -> Result<String, TransportError> {
        Ok(Uuid::new_v4().to_string())
    }

    async fn close(&self, _server: &Server, _connection_id: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn execute(
        &self,
        server: &Server,
        _connection_id: &str,
        command: &str,
    ) -> Result<String, TransportError> {
        Ok(Self::respond(server, command))
    }

    async fn probe(&self, _server: &Server, _connection_id: &str) -> Result<(), TransportError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server() -> Server {
        Server {
            id: 1,
            name: "db1".into(),
            host: "10.0.0.1".into(),
            port: 5432,
            server_type: "database".into(),
            api_key: None,
            connected: true,
            connection_id: Some("tok".into()),
            connection_error_count: 0,
            command_error_count: 0,
            last_connected: None,
            last_error: None,
            last_metrics: None,
        }
    }

    #[tokio::test]
    async fn output_depends_on_command_prefix() {
        let transport = SimulatedTransport::new();
        let s = server();

        let listing = transport.execute(&s, "tok", "ls -la").await.unwrap();
        assert!(listing.contains("README.md"));

        let cat = transport.execute(&s, "tok", "cat notes.txt").await.unwrap();
        assert!(cat.starts_with("Contents of notes.txt:"));

        let ps = transport.execute(&s, "tok", "TASKLIST").await.unwrap();
        assert!(ps.contains("mcp_server"));

        let ping = transport.execute(&s, "tok", "ping example.org").await.unwrap();
        assert!(ping.contains("Reply from example.org"));

        let other = transport.execute(&s, "tok", "uptime").await.unwrap();
        assert_eq!(other, "Executed command 'uptime' on db1 (mock execution)");
    }

    #[tokio::test]
    async fn open_issues_distinct_tokens() {
        let transport = SimulatedTransport::new();
        let a = transport.open(&server()).await.unwrap();
        let b = transport.open(&server()).await.unwrap();
        assert_ne!(a, b);
    }
}
