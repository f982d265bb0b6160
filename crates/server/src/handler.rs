//! Handler trait for processing transfer requests.
//!
//! Implementors provide the transfer logic while the server framework
//! handles connection management and routing.

use std::future::Future;
use std::pin::Pin;

use transferit_protocol::MessageType;
use transferit_protocol::constants::WS_ERR_CODE_NOT_IMPLEMENTED;
use transferit_protocol::envelope::Message;

use crate::connection::Sender;

/// A boxed future returned by handler methods.
pub type HandlerFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// Trait for handling requests from a connected client.
///
/// The server dispatches each parsed envelope to the method matching its
/// type. Each method receives:
/// - `sender`: channel to send the response back on the same connection
/// - `msg`: the parsed JSON envelope
///
/// Default implementations reply with "not implemented" so handlers only
/// need to override the message types they serve.
pub trait Handler: Send + Sync + 'static {
    /// Called for `ping` messages.
    fn on_ping(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        Box::pin(async move {
            if let Ok(reply) = msg.reply(MessageType::Pong, Option::<&()>::None) {
                let _ = sender.send_msg(reply);
            }
        })
    }

    /// Called for `init_upload`.
    fn on_init_upload(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `upload_chunk`.
    fn on_upload_chunk(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `download_chunk`.
    fn on_download_chunk(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `confirm_chunk_downloaded`.
    fn on_confirm_chunk_downloaded(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `get_current_segment_number`.
    fn on_get_current_segment_number(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called for `get_transfer_status`.
    fn on_get_transfer_status(&self, sender: Sender, msg: Message) -> HandlerFuture<'_> {
        not_implemented(sender, msg)
    }

    /// Called when a client disconnects (cleanup hook).
    fn on_disconnected(&self) -> HandlerFuture<'_> {
        Box::pin(async {})
    }
}

fn not_implemented<'a>(sender: Sender, msg: Message) -> HandlerFuture<'a> {
    Box::pin(async move {
        let _ = sender.send_error(&msg, WS_ERR_CODE_NOT_IMPLEMENTED, "not implemented");
    })
}
