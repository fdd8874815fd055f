use {super::*, shaft::BanningOptions};

const REGTEST_BITS: &str = "207fffff";
const MAINNET_BITS: &str = "1d00ffff";

fn worker() -> String {
    format!("{ADDRESS}.rig")
}

#[tokio::test]
async fn miner_finds_a_block() {
    let pool = TestPool::start(REGTEST_BITS).await;
    let worker = worker();

    let mut miner = pool.connect().await;
    let notify = miner.activate(&worker).await;

    let mut nonce = 0;
    while pool.node.calls("submitblock").is_empty() {
        assert!(nonce < 64, "no block found after {nonce} shares");

        let reply = miner
            .submit(10 + u64::from(nonce), &worker, &notify, nonce)
            .await;
        pretty_assert_eq!(reply["result"], true);
        pretty_assert_eq!(reply["error"], Value::Null);

        nonce += 1;

        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let submitted = pool.node.calls("submitblock");
    assert_eq!(submitted.len(), 1);
    assert!(submitted[0][0].as_str().unwrap().starts_with("00000020"));

    timeout(Duration::from_secs(5), async {
        while pool.pool.metatron().blocks() == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(pool.node.calls("getblock").len(), 1);

    let events = pool.stop().await;

    let shares = events
        .iter()
        .filter(|event| event["type"] == "share")
        .count();
    assert_eq!(shares, usize::try_from(nonce).unwrap());

    let blocks = events
        .iter()
        .filter(|event| event["type"] == "block_found")
        .collect::<Vec<_>>();
    assert_eq!(blocks.len(), 1);
    pretty_assert_eq!(blocks[0]["worker"], json!(worker));
    pretty_assert_eq!(blocks[0]["height"], 101);
    pretty_assert_eq!(blocks[0]["accepted"], true);
}

#[tokio::test]
async fn duplicate_shares_are_rejected() {
    let pool = TestPool::start(MAINNET_BITS).await;
    let worker = worker();

    let mut miner = pool.connect().await;
    let notify = miner.activate(&worker).await;

    let reply = miner.submit(10, &worker, &notify, 7).await;
    pretty_assert_eq!(reply["result"], true);

    let reply = miner.submit(11, &worker, &notify, 7).await;
    pretty_assert_eq!(reply["error"], json!([22, "duplicate share", null]));

    assert!(pool.node.calls("submitblock").is_empty());

    let events = pool.stop().await;
    let errors = events
        .iter()
        .map(|event| event["error"].clone())
        .collect::<Vec<_>>();
    pretty_assert_eq!(errors, vec![Value::Null, json!("duplicate share")]);
}

#[tokio::test]
async fn block_notify_pushes_a_clean_job() {
    let pool = TestPool::start(MAINNET_BITS).await;

    let mut miner = pool.connect().await;
    let first = miner.activate(&worker()).await;

    pool.node
        .respond("getblocktemplate", template(&"22".repeat(32), 102, MAINNET_BITS));

    pool.notify_block(&"22".repeat(32), NOTIFY_PASSWORD).await;

    let next = miner.wait_for("mining.notify").await;
    assert_ne!(next["params"][0], first["params"][0]);
    assert_ne!(next["params"][1], first["params"][1]);
    pretty_assert_eq!(next["params"][8], true);

    pretty_assert_eq!(
        pool.pool.job_manager().current_job().unwrap().height(),
        102
    );

    pool.stop().await;
}

#[tokio::test]
async fn block_notify_requires_the_password() {
    let pool = TestPool::start(MAINNET_BITS).await;

    pool.node
        .respond("getblocktemplate", template(&"22".repeat(32), 102, MAINNET_BITS));

    pool.notify_block(&"22".repeat(32), "wrong").await;

    tokio::time::sleep(Duration::from_millis(200)).await;

    pretty_assert_eq!(
        pool.pool.job_manager().current_job().unwrap().height(),
        101
    );

    pool.stop().await;
}

#[tokio::test]
async fn oversized_lines_close_the_connection() {
    let pool = TestPool::start(MAINNET_BITS).await;

    let mut miner = pool.connect().await;
    miner.write(&"a".repeat(4096)).await;
    miner.closed().await;

    pool.stop().await;
}

#[tokio::test]
async fn banned_miners_cannot_reconnect() {
    let pool = TestPool::start_with(MAINNET_BITS, |settings| {
        settings.banning = Some(BanningOptions {
            check_threshold: 2,
            ..Default::default()
        });
    })
    .await;
    let worker = worker();

    let mut miner = pool.connect().await;
    miner.activate(&worker).await;

    for id in 10..12 {
        let reply = miner
            .request(
                id,
                "mining.submit",
                json!([worker, "ff", "00000000", "00000000", "00000000"]),
            )
            .await;
        pretty_assert_eq!(reply["error"][0], 21);
    }

    miner.closed().await;

    pool.connect().await.closed().await;

    pool.stop().await;
}

#[tokio::test]
async fn unknown_workers_are_refused() {
    let pool = TestPool::start(MAINNET_BITS).await;
    pool.node.respond("validateaddress", json!({"isvalid": false}));

    let mut miner = pool.connect().await;
    miner
        .request(1, "mining.subscribe", json!(["cpuminer/2.5"]))
        .await;
    miner.wait_for("mining.notify").await;

    let authorized = miner
        .request(2, "mining.authorize", json!(["nobody", "x"]))
        .await;
    pretty_assert_eq!(authorized["result"], false);

    pool.stop().await;
}
