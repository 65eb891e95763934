//! IMAP connector using async-imap 0.11 with tokio-rustls.

use std::mem;
use std::sync::Arc;

use async_imap::types::{Name, NameAttribute};
use async_imap::{Client, Session};
use async_trait::async_trait;
use futures::StreamExt;
use rustls_native_certs::load_native_certs;
use tokio::net::TcpStream;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerName};
use tokio_rustls::TlsConnector;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};
use tracing::{debug, warn};

use super::{MailError, MailSession, MailTransport, RemoteFolder, SelectInfo};

type TlsSession = Session<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;
type TlsClient = Client<Compat<tokio_rustls::client::TlsStream<TcpStream>>>;

pub struct ImapTransport;

#[async_trait]
impl MailTransport for ImapTransport {
    async fn connect(&self, host: &str, port: u16) -> Result<Box<dyn MailSession>, MailError> {
        let mut root_store = RootCertStore::empty();
        let certs = load_native_certs()
            .map_err(|e| MailError::Connection(format!("loading native certs: {e}")))?;
        for cert in certs {
            root_store
                .add(&tokio_rustls::rustls::Certificate(cert.0))
                .map_err(|e| MailError::Connection(format!("adding cert to root store: {e}")))?;
        }

        let config = ClientConfig::builder()
            .with_safe_defaults()
            .with_root_certificates(root_store)
            .with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));

        let tcp = TcpStream::connect((host, port))
            .await
            .map_err(|e| MailError::Connection(format!("connecting to {host}:{port}: {e}")))?;

        let server_name = ServerName::try_from(host)
            .map_err(|e| MailError::Connection(format!("invalid DNS name {host}: {e}")))?;
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .map_err(|e| MailError::Connection(format!("starting TLS for {host}: {e}")))?;

        let mut client = Client::new(tls_stream.compat());
        client
            .read_response()
            .await
            .map_err(|e| MailError::Connection(format!("reading IMAP greeting: {e}")))?
            .ok_or_else(|| {
                MailError::Connection("unexpected end of stream, expected greeting".into())
            })?;

        debug!(host, port, "IMAP connection established");
        Ok(Box::new(ImapMailSession {
            state: State::Connected(client),
        }))
    }
}

enum State {
    Connected(TlsClient),
    Authenticated(TlsSession),
    Poisoned,
}

pub struct ImapMailSession {
    state: State,
}

impl ImapMailSession {
    fn session(&mut self) -> Result<&mut TlsSession, MailError> {
        match &mut self.state {
            State::Authenticated(session) => Ok(session),
            _ => Err(MailError::Protocol("session not authenticated".into())),
        }
    }
}

#[async_trait]
impl MailSession for ImapMailSession {
    async fn authenticate(&mut self, user: &str, password: &str) -> Result<(), MailError> {
        match mem::replace(&mut self.state, State::Poisoned) {
            State::Connected(client) => match client.login(user, password).await {
                Ok(session) => {
                    self.state = State::Authenticated(session);
                    Ok(())
                }
                Err((err, _client)) => {
                    Err(MailError::Connection(format!("LOGIN failed for {user}: {err}")))
                }
            },
            State::Authenticated(session) => {
                self.state = State::Authenticated(session);
                Ok(())
            }
            State::Poisoned => Err(MailError::Connection("session poisoned".into())),
        }
    }

    async fn select(&mut self, folder: &str) -> Result<SelectInfo, MailError> {
        let session = self.session()?;
        let mailbox = session.select(folder).await.map_err(|e| match e {
            async_imap::error::Error::No(_) => MailError::FolderNotFound(folder.to_string()),
            other => map_imap_err(other),
        })?;

        Ok(SelectInfo {
            uid_next: mailbox.uid_next,
            uid_validity: mailbox.uid_validity,
            messages_total: mailbox.exists,
            messages_recent: mailbox.recent,
            messages_unseen: mailbox.unseen.unwrap_or(0),
        })
    }

    async fn search_all(&mut self, _folder: &str) -> Result<Vec<u32>, MailError> {
        let session = self.session()?;
        let uid_set = session.uid_search("ALL").await.map_err(map_imap_err)?;
        Ok(uid_set.into_iter().collect())
    }

    async fn fetch_by_uid(&mut self, _folder: &str, uid: u32) -> Result<Vec<u8>, MailError> {
        let session = self.session()?;
        let mut stream = session
            .uid_fetch(uid.to_string(), "(UID BODY.PEEK[])")
            .await
            .map_err(map_imap_err)?;

        let mut body = Vec::new();
        while let Some(fetch_result) = stream.next().await {
            let fetch = fetch_result.map_err(map_imap_err)?;
            if fetch.uid == Some(uid) {
                body = fetch.body().unwrap_or(&[]).to_vec();
            }
        }
        Ok(body)
    }

    async fn list_folders(&mut self, pattern: &str) -> Result<Vec<RemoteFolder>, MailError> {
        let session = self.session()?;
        let mut stream = session
            .list(Some(""), Some(pattern))
            .await
            .map_err(map_imap_err)?;

        let mut names: Vec<Name> = Vec::new();
        while let Some(item) = stream.next().await {
            match item {
                Ok(name) => names.push(name),
                Err(e) => warn!(error = %e, "Skipping unparsable LIST entry"),
            }
        }
        drop(stream);

        let mut folders = Vec::new();
        for name in &names {
            let delimiter = name.delimiter().map(|d| d.to_string());
            let path = name.name().to_string();
            let leaf = match &delimiter {
                Some(d) if !d.is_empty() => path
                    .rsplit(d.as_str())
                    .next()
                    .unwrap_or(path.as_str())
                    .to_string(),
                _ => path.clone(),
            };
            let flags: Vec<String> = name.attributes().iter().map(attribute_str).collect();
            let no_select = flags.iter().any(|f| f.eq_ignore_ascii_case("\\Noselect"));
            folders.push(RemoteFolder {
                name: leaf,
                path,
                delimiter,
                flags,
                no_select,
            });
        }
        Ok(folders)
    }

    async fn delimiter(&mut self) -> Result<Option<String>, MailError> {
        let session = self.session()?;
        let mut stream = session.list(Some(""), Some("")).await.map_err(map_imap_err)?;
        let mut delim = None;
        while let Some(item) = stream.next().await {
            if let Ok(name) = item {
                if delim.is_none() {
                    delim = name.delimiter().map(|d| d.to_string());
                }
            }
        }
        Ok(delim)
    }
}

fn attribute_str(attr: &NameAttribute<'_>) -> String {
    match attr {
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
        NameAttribute::Extension(s) => s.to_string(),
        other => format!("\\{other:?}"),
    }
}

fn map_imap_err(err: async_imap::error::Error) -> MailError {
    use async_imap::error::Error;
    match err {
        Error::Io(e) => MailError::Connection(e.to_string()),
        Error::ConnectionLost => MailError::Connection("connection lost".into()),
        other => MailError::Protocol(other.to_string()),
    }
}
