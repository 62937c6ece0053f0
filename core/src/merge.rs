/// Pure merge of message collections: the ordering core of the engine.
///
/// `merge` is idempotent and commutative over the *set* of messages, so the
/// final list is the same regardless of the arrival order of cache load,
/// page fetch and live push. Duplicate server identities collapse to the
/// copy with the smallest order key, and an optimistic placeholder is
/// replaced in place once its
/// server-confirmed echo shows up.
use crate::message::ChatMessage;

/// Merge `incoming` into `base` and return the reordered result.
pub fn merge(base: &[ChatMessage], incoming: &[ChatMessage]) -> Vec<ChatMessage> {
    let mut out: Vec<ChatMessage> = base.to_vec();
    for msg in incoming {
        integrate(&mut out, msg);
    }
    // Stable sort: equal keys keep insertion order, which is what keeps an
    // optimistic echo in place until its server copy arrives.
    out.sort_by_key(ChatMessage::order_key);
    out
}

fn integrate(out: &mut Vec<ChatMessage>, msg: &ChatMessage) {
    if msg.id.is_some() {
        // Already known under the same server id. The two copies can still
        // carry different timestamps (live frames are stamped at arrival,
        // the pull API returns the server's instant), so keep the one with
        // the smaller order key rather than whichever arrived first.
        if let Some(existing) = out.iter_mut().find(|e| e.same_identity(msg)) {
            if msg.order_key() < existing.order_key() {
                *existing = msg.clone();
            }
            return;
        }
        // Server-confirmed copy of an optimistic send: replace the
        // placeholder, inheriting its insertion counter so the entry does
        // not move relative to same-timestamp neighbours.
        if let Some(existing) = out.iter_mut().find(|e| msg.is_server_echo_of(e)) {
            let seq = existing.seq;
            *existing = msg.clone();
            existing.seq = seq;
            return;
        }
        out.push(msg.clone());
        return;
    }

    // Id-less incoming entry (an optimistic send, possibly replayed from the
    // cache). Skip it if its confirmed copy or the exact same local entry is
    // already present. Two distinct id-less sends with identical content are
    // kept on purpose: rate-limiting a double-submit is a UI concern.
    if out
        .iter()
        .any(|e| e.is_server_echo_of(msg) || e.same_local_entry(msg))
    {
        return;
    }
    out.push(msg.clone());
}

/// Order invariant check, used by tests and debug assertions.
pub fn is_ordered(messages: &[ChatMessage]) -> bool {
    messages
        .windows(2)
        .all(|w| w[0].order_key() <= w[1].order_key())
}
