use super::{Peer, Pipe, PipeId};
use crate::command::Mailbox;
use crate::config::{Config, PipeOptions};
use crate::error::Result;
use crate::queue;

/// Low watermark for an inbound high watermark `hwm`.
///
/// Large watermarks keep the two at most `max_wm_delta` apart so the reader
/// reports progress regularly; small ones report at roughly half-way.
pub fn compute_lwm(hwm: u64, max_wm_delta: u64) -> u64 {
    if hwm > max_wm_delta.saturating_mul(2) {
        hwm - max_wm_delta
    } else {
        hwm.div_ceil(2)
    }
}

/// Creates two connected pipe endpoints.
///
/// `owners[i]` is the mailbox of the thread driving endpoint `i`, and
/// `options[i]` configures that endpoint; its `hwm` bounds the messages in
/// flight towards it. Commands for endpoint A go to `owners[0]`.
pub fn pipepair(
    owners: [Mailbox; 2],
    options: [PipeOptions; 2],
    config: &Config,
) -> Result<(Pipe, Pipe)> {
    config.validate()?;

    let [owner_a, owner_b] = owners;
    let [options_a, options_b] = options;
    let (id_a, id_b) = (PipeId::next(), PipeId::next());

    // Queue 1 carries B -> A, queue 2 carries A -> B.
    let (writer_1, reader_1) = queue::channel();
    let (writer_2, reader_2) = queue::channel();

    let a = Pipe::new(
        id_a,
        reader_1,
        writer_2,
        options_a.hwm,
        options_b.hwm,
        options_a.delay,
        Peer {
            id: id_b,
            mailbox: owner_b,
        },
        config,
    );
    let b = Pipe::new(
        id_b,
        reader_2,
        writer_1,
        options_b.hwm,
        options_a.hwm,
        options_b.delay,
        Peer {
            id: id_a,
            mailbox: owner_a,
        },
        config,
    );

    log::debug!(
        "Pipe pair created: {} (hwm {}) <-> {} (hwm {})",
        id_a,
        options_a.hwm,
        id_b,
        options_b.hwm
    );

    Ok((a, b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::mailbox;
    use crate::error::ErrorKind;

    #[test]
    fn test_lwm_below_hwm() {
        for delta in [1, 2, 8, 1024] {
            for hwm in 2..3000 {
                let lwm = compute_lwm(hwm, delta);
                assert!(lwm > 0, "hwm={} delta={}", hwm, delta);
                assert!(lwm < hwm, "hwm={} delta={}", hwm, delta);
                assert!(hwm - lwm <= delta.max(hwm / 2), "hwm={} delta={}", hwm, delta);
            }
        }
    }

    #[test]
    fn test_lwm_values() {
        assert_eq!(compute_lwm(0, 1024), 0);
        assert_eq!(compute_lwm(1, 1024), 1);
        assert_eq!(compute_lwm(4, 1024), 2);
        assert_eq!(compute_lwm(5, 1024), 3);
        assert_eq!(compute_lwm(1000, 1024), 500);
        assert_eq!(compute_lwm(5000, 1024), 3976);
        assert_eq!(compute_lwm(10, u64::MAX), 5);
    }

    #[test]
    fn test_pair_cross_assigns_watermarks() {
        let (mailbox_a, _inbox_a) = mailbox();
        let (mailbox_b, _inbox_b) = mailbox();
        let options = [
            PipeOptions::new().with_hwm(10),
            PipeOptions::new().with_hwm(20).with_delay(false),
        ];

        let (a, b) = pipepair([mailbox_a, mailbox_b], options, &Config::default()).unwrap();

        assert_eq!(a.hwm(), 20);
        assert_eq!(a.lwm(), 5);
        assert_eq!(b.hwm(), 10);
        assert_eq!(b.lwm(), 10);

        assert_eq!(a.peer_id(), b.id());
        assert_eq!(b.peer_id(), a.id());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_pair_rejects_invalid_config() {
        let (mailbox_a, _inbox_a) = mailbox();
        let (mailbox_b, _inbox_b) = mailbox();
        let config = Config::default().with_max_wm_delta(0);

        let err = pipepair(
            [mailbox_a, mailbox_b],
            [PipeOptions::default(), PipeOptions::default()],
            &config,
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }
}
