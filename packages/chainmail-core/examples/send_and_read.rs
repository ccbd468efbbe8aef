//! # Send and Read Demo
//!
//! Sends a message to a fresh recipient key through an in-memory "chain",
//! then reads it back from the recorded transaction data.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=chainmail_core=debug cargo run --example send_and_read
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;

use chainmail_core::mailbox::{JsonCodec, Message};
use chainmail_core::storage::{FileContentStore, MemoryCache};
use chainmail_core::{Fetcher, Mailbox, PrivateKey, Result, SendOpts, Sender, Signer};

/// Keeps the last transaction's data instead of broadcasting it
#[derive(Default)]
struct InMemoryChain {
    last: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl Sender for InMemoryChain {
    async fn send(
        &self,
        to: &[u8],
        from: &[u8],
        data: &[u8],
        signer: &dyn Signer,
        _opts: &SendOpts,
    ) -> Result<()> {
        let signature = signer.sign(data)?;
        println!(
            "  tx {} -> {}: {} bytes, signature {}...",
            String::from_utf8_lossy(from),
            String::from_utf8_lossy(to),
            data.len(),
            hex::encode(&signature[..8.min(signature.len())])
        );
        *self.last.lock() = Some(data.to_vec());
        Ok(())
    }
}

/// Stand-in for a wallet signer
struct DemoSigner;

impl Signer for DemoSigner {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        Ok(chainmail_core::digest::create(
            chainmail_core::HashKind::Sha2_256,
            payload,
        )?)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Chainmail Core: Send and Read Demo ===\n");

    let storage = tempfile::tempdir()
        .map_err(|e| chainmail_core::Error::StorageWriteError(e.to_string()))?;
    let chain = Arc::new(InMemoryChain::default());
    let mailbox = Mailbox::new(
        JsonCodec,
        Arc::new(FileContentStore::new(storage.path())),
        chain.clone(),
        Fetcher::new(Arc::new(MemoryCache::new()))?,
    );

    let recipient = PrivateKey::generate();
    println!("Step 1: Recipient public key {}\n", recipient.public_key());

    println!("Step 2: Sending...");
    let message = Message::new("alice@demo.chain", "bob@demo.chain", "Hello", "Hi Bob!");
    let sent = mailbox
        .send(
            &message,
            &recipient.public_key(),
            b"bob",
            b"alice",
            &DemoSigner,
            &SendOpts::default(),
        )
        .await?;
    println!("  stored at      {}", sent.location);
    println!("  content hash   {}", sent.content_hash);
    println!("  message hash   {}\n", sent.message_hash);

    println!("Step 3: Reading back...");
    let data = chain.last.lock().clone().unwrap_or_default();
    let read = mailbox.read(&data, &recipient).await?;
    println!("  {} -> {}: {:?} / {:?}", read.from, read.to, read.subject, read.body);
    assert_eq!(read, message);

    println!("\nStep 4: Reading with the wrong key...");
    match mailbox.read(&data, &PrivateKey::generate()).await {
        Ok(_) => println!("  unexpectedly succeeded"),
        Err(e) => println!("  {} (code {})", e, e.code()),
    }

    Ok(())
}
