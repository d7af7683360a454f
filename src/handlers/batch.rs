//! Reply batching.

use slbnc_proto::Message;

use super::core::Context;
use crate::error::HandlerResult;

/// Send `msgs` inside a `BATCH` of type `kind` when the client enabled
/// `batch`, or as they are otherwise.
pub(super) fn send_batch(
    ctx: &mut Context<'_>,
    kind: &str,
    params: &[String],
    msgs: Vec<Message>,
) -> HandlerResult {
    if !ctx.session.handle.caps().batch {
        for msg in msgs {
            ctx.send(msg)?;
        }
        return Ok(());
    }

    let reference = ctx.session.next_batch_ref();
    let mut start = vec![format!("+{reference}"), kind.to_string()];
    start.extend(params.iter().cloned());
    ctx.send_from_server(Message::new("BATCH", start))?;
    for msg in msgs {
        ctx.send(msg.with_tag("batch", Some(reference.clone())))?;
    }
    ctx.send_from_server(Message::new("BATCH", [format!("-{reference}")]))
}
