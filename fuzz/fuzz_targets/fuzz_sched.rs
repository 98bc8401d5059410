#![no_main]

use std::collections::{HashMap, VecDeque};

use libfuzzer_sys::fuzz_target;
use numiqos::{ClientInfo, PullReq, PullScheduler, QosConfig, ReqParams};

fuzz_target!(|data: &[u8]| {
    for use_heap in [true, false] {
        run(data, use_heap);
    }
});

fn run(data: &[u8], use_heap: bool) {
    let cfg = QosConfig {
        use_heap,
        ..QosConfig::default()
    };
    let sched: PullScheduler<u8, u32> = PullScheduler::new(
        |c: &u8| {
            let c = *c;
            ClientInfo::new(
                f64::from(c % 4),
                f64::from((c >> 2) % 4),
                f64::from(c % 3) * 2.0,
            )
        },
        &cfg,
    )
    .expect("default ages are valid");

    let mut now = 0.0f64;
    let mut next_id = 0u32;
    let mut queued = 0usize;
    let mut expected: HashMap<u8, VecDeque<u32>> = HashMap::new();

    for chunk in data.chunks_exact(3) {
        let client = chunk[1] % 8;
        now += f64::from(chunk[2]) * 0.01;
        match chunk[0] % 4 {
            0 | 1 => {
                let params = ReqParams::new(u32::from(chunk[2] % 3), u32::from(chunk[1] % 3));
                if sched
                    .add_request_with(next_id, &client, params, now, 0.0)
                    .is_ok()
                {
                    expected.entry(client).or_default().push_back(next_id);
                    queued += 1;
                }
                next_id += 1;
            }
            2 => match sched.pull_request_at(now) {
                PullReq::Returning {
                    client, request, ..
                } => {
                    let fifo = expected.get_mut(&client).expect("dispatched unknown client");
                    assert_eq!(fifo.pop_front(), Some(request), "FIFO order violated");
                    queued -= 1;
                }
                PullReq::Future(when) => assert!(when > now, "future deadline not ahead of now"),
                PullReq::None => assert_eq!(queued, 0),
            },
            _ => {
                let mut drained = Vec::new();
                sched.remove_by_client_into(&client, |r| drained.push(r));
                if let Some(fifo) = expected.get_mut(&client) {
                    assert_eq!(drained, Vec::from(fifo.clone()));
                    queued -= fifo.len();
                    fifo.clear();
                }
            }
        }
        assert_eq!(sched.request_count(), queued);
    }

    // every accepted submission must come back out exactly once
    loop {
        match sched.pull_request_at(now) {
            PullReq::Returning {
                client, request, ..
            } => {
                let fifo = expected.get_mut(&client).expect("dispatched unknown client");
                assert_eq!(fifo.pop_front(), Some(request), "FIFO order violated");
                queued -= 1;
            }
            PullReq::Future(when) => {
                assert!(when > now);
                now = when;
            }
            PullReq::None => break,
        }
    }
    assert_eq!(queued, 0);
    assert!(sched.is_empty());
    assert!(expected.values().all(VecDeque::is_empty));
}
