//! SSH transport built on libssh2. Each `connect` opens a fresh TCP
//! connection and session; commands run on their own channel and files move
//! over SCP.

use anyhow::{Context, Result, bail};
use ssh2::{Channel, CheckResult, ExtendedData, HashType, KnownHostFileKind, Session};
use std::fs::File;
use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::remote::{CommandOutput, Credential, HostKeyPolicy, RemoteShell, ShellConnector};

const SSH_PORT: u16 = 22;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct SshConnector {
    pub port: u16,
    pub connect_timeout: Duration,
}

impl Default for SshConnector {
    fn default() -> Self {
        Self {
            port: SSH_PORT,
            connect_timeout: CONNECT_TIMEOUT,
        }
    }
}

impl ShellConnector for SshConnector {
    type Shell = SshShell;

    fn connect(&self, host: &str, credential: &Credential) -> Result<SshShell> {
        let addr = (host, self.port)
            .to_socket_addrs()
            .with_context(|| format!("Failed to resolve {}", host))?
            .next()
            .with_context(|| format!("No address for {}", host))?;
        let tcp = TcpStream::connect_timeout(&addr, self.connect_timeout)
            .with_context(|| format!("Failed to connect to {}:{}", host, self.port))?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake().context("SSH handshake failed")?;
        check_host_key(&session, host, self.port, credential.host_keys)?;

        session
            .userauth_pubkey_file(&credential.user, None, &credential.private_key, None)
            .with_context(|| format!("SSH authentication failed for {}@{}", credential.user, host))?;
        if !session.authenticated() {
            bail!("SSH authentication rejected for {}@{}", credential.user, host);
        }
        debug!("SSH session established with {}@{}", credential.user, host);
        Ok(SshShell {
            session,
            running: None,
        })
    }
}

fn check_host_key(session: &Session, host: &str, port: u16, policy: HostKeyPolicy) -> Result<()> {
    let fingerprint = session
        .host_key_hash(HashType::Sha256)
        .map(hex::encode)
        .unwrap_or_else(|| "unknown".to_string());
    match policy {
        HostKeyPolicy::AcceptAny => {
            trust_host_key(host, &fingerprint);
            Ok(())
        }
        HostKeyPolicy::KnownHosts => {
            let (key, _) = session.host_key().context("Server presented no host key")?;
            let mut known = session.known_hosts()?;
            let file = known_hosts_file()?;
            known
                .read_file(&file, KnownHostFileKind::OpenSSH)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            match known.check_port(host, port, key) {
                CheckResult::Match => Ok(()),
                CheckResult::NotFound => {
                    bail!("Host key of {} (sha256 {}) is not in {}", host, fingerprint, file.display())
                }
                CheckResult::Mismatch => {
                    bail!("Host key of {} (sha256 {}) does not match {}", host, fingerprint, file.display())
                }
                CheckResult::Failure => bail!("Failed to check host key of {}", host),
            }
        }
    }
}

fn trust_host_key(host: &str, fingerprint: &str) {
    info!("Trusting host key of {} (sha256 {})", host, fingerprint);
}

fn known_hosts_file() -> Result<PathBuf> {
    let home = std::env::var_os("HOME").context("HOME not set")?;
    Ok(PathBuf::from(home).join(".ssh").join("known_hosts"))
}

pub struct SshShell {
    session: Session,
    /// Channel of the command started and not yet finished.
    running: Option<Channel>,
}

impl RemoteShell for SshShell {
    fn upload(&mut self, local: &Path, remote: &str) -> Result<()> {
        let mut content = Vec::new();
        File::open(local)
            .and_then(|mut f| f.read_to_end(&mut content))
            .with_context(|| format!("Failed to read {}", local.display()))?;

        let mut channel = self
            .session
            .scp_send(Path::new(remote), 0o644, content.len() as u64, None)
            .with_context(|| format!("Failed to open SCP upload to {}", remote))?;
        channel.write_all(&content)?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;
        info!("Copied {} to remote {}", local.display(), remote);
        Ok(())
    }

    fn start(&mut self, command: &str) -> Result<()> {
        let mut channel = self.session.channel_session()?;
        // stderr is interleaved into stdout in the order the remote wrote it.
        channel.handle_extended_data(ExtendedData::Merge)?;
        channel
            .exec(command)
            .with_context(|| format!("Failed to start remote command: {}", command))?;
        self.running = Some(channel);
        Ok(())
    }

    fn finish(&mut self) -> Result<CommandOutput> {
        let mut channel = self.running.take().context("No remote command running")?;
        let mut out = CommandOutput::default();
        channel.read_to_end(&mut out.stdout)?;
        channel.wait_close()?;
        out.exit_status = channel.exit_status()?;
        Ok(out)
    }

    fn download(&mut self, remote: &str, local: &Path) -> Result<()> {
        let (mut channel, stat) = self
            .session
            .scp_recv(Path::new(remote))
            .with_context(|| format!("Failed to fetch remote file {}", remote))?;
        let mut content = Vec::with_capacity(stat.size() as usize);
        channel.read_to_end(&mut content)?;
        channel.send_eof()?;
        channel.wait_eof()?;
        channel.close()?;
        channel.wait_close()?;

        File::create(local)
            .and_then(|mut f| f.write_all(&content))
            .with_context(|| format!("Failed to write {}", local.display()))?;
        info!("Copied remote {} to {}", remote, local.display());
        Ok(())
    }
}
