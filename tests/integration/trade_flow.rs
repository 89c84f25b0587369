//! End-to-end runs of `make_trade` against the in-memory services.

use ethers::signers::Signer;
use ethers::types::U256;
use std::time::Duration;

use gpv2_trader::chain::ChainContext;
use gpv2_trader::engine::order_builder::OrderParams;
use gpv2_trader::engine::selector::SelectionConfig;
use gpv2_trader::engine::settlement::SettlementOutcome;
use gpv2_trader::engine::slippage::{slippage_bps, Slippage};
use gpv2_trader::engine::trader::{TradeReport, TradeSettings, Trader};
use gpv2_trader::random::ScriptedRandom;
use gpv2_trader::signing::{app_data, recover_signer};
use gpv2_trader::types::*;

use crate::mock_services::*;

fn settings() -> TradeSettings {
    TradeSettings {
        selection: SelectionConfig::default(),
        order: OrderParams::new(app_data("GPv2 Trading Bot")),
        settlement_timeout: Duration::from_millis(50),
        event_poll_interval: Duration::from_millis(5),
    }
}

async fn run(
    book: &MockOrderBook,
    chain: &MockChain,
    universe: &[Asset],
    settings: TradeSettings,
) -> anyhow::Result<TradeReport> {
    let ctx = rinkeby();
    let wallet = wallet();
    let trader = Trader::new(&ctx, book, chain, chain, &wallet, settings);
    trader
        .make_trade(universe, &mut ScriptedRandom::identity())
        .await
}

fn trader_error(err: &anyhow::Error) -> Option<&TraderError> {
    err.downcast_ref::<TraderError>()
}

#[tokio::test]
async fn test_sells_balance_minus_fee() {
    let (x, y) = (token(1, "X"), token(2, "Y"));
    let chain = MockChain::for_wallet(&wallet())
        .with_balance(&x, 1000)
        .with_balances(&y, &[0, 1990]);
    let book = MockOrderBook::new(rinkeby())
        .with_pair(&x, &y, PairRule::new(50, 2000, 950))
        .emitting_events_to(chain.log_sink());

    let report = run(&book, &chain, &[x.clone(), y.clone()], settings())
        .await
        .unwrap();

    assert_eq!(report.sell, x);
    assert_eq!(report.buy, y);
    assert_eq!(report.outcome, SettlementOutcome::SettledByEvent);
    assert_eq!(report.final_buy_balance, U256::from(1990u64));

    let placed = book.placed();
    assert_eq!(placed.len(), 1);
    let order = &placed[0].order;
    assert_eq!(order.sell_amount, U256::from(950u64));
    assert_eq!(order.buy_amount, U256::from(1990u64));
    assert_eq!(order.fee_amount, U256::from(50u64));
    assert_eq!(order.kind, OrderKind::Sell);
    assert_eq!(order.app_data, app_data("GPv2 Trading Bot"));
    assert_eq!(
        recover_signer(&rinkeby(), order, &placed[0].signature).unwrap(),
        wallet().address()
    );

    // unlimited approval to the vault relayer, once
    assert_eq!(
        chain.approvals(),
        vec![(x.address, rinkeby().vault_relayer, U256::MAX)]
    );
    assert_eq!(chain.filters_opened(), 1);
    assert_eq!(chain.filters_closed(), 1);
}

#[tokio::test]
async fn test_fee_above_fresh_balance_fails_before_signing() {
    let (x, y) = (token(1, "X"), token(2, "Y"));
    // 2000 at scan time, 1000 when re-read just before the order
    let chain = MockChain::for_wallet(&wallet()).with_balances(&x, &[2000, 1000]);
    let book = MockOrderBook::new(rinkeby()).with_pair(&x, &y, PairRule::new(1200, 2, 1));

    let err = run(&book, &chain, &[x, y], settings()).await.unwrap_err();

    assert!(matches!(
        trader_error(&err),
        Some(TraderError::InsufficientBalanceForFee { .. })
    ));
    assert!(book.placed().is_empty());
    assert_eq!(chain.filters_opened(), 0);
}

#[tokio::test]
async fn test_fee_above_balance_everywhere_leaves_nothing_to_trade() {
    let (x, y) = (token(1, "X"), token(2, "Y"));
    let chain = MockChain::for_wallet(&wallet()).with_balance(&x, 1000);
    let book = MockOrderBook::new(rinkeby()).with_pair(&x, &y, PairRule::new(1200, 2, 1));

    let err = run(&book, &chain, &[x, y], settings()).await.unwrap_err();

    match trader_error(&err) {
        Some(TraderError::NoTradableBalance { network, account }) => {
            assert_eq!(network, "rinkeby");
            assert_eq!(*account, wallet().address());
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("Fund the bot's rinkeby account"));
    assert!(book.placed().is_empty());
}

#[test]
fn test_reference_trade_slippage() {
    let s = slippage_bps(
        U256::from(10u64),
        U256::from(1u64),
        U256::from(900u64),
        U256::from(100u64),
    );
    assert_eq!(s, Some(Slippage::Bps(1111)));
}

#[tokio::test]
async fn test_native_fallback_only() {
    let (x, y, native) = (token(1, "X"), token(2, "Y"), weth());
    let chain = MockChain::for_wallet(&wallet()).with_balance(&x, 1000);
    // ~526 bps on both pairs: above 100, below 1000
    let book = MockOrderBook::new(rinkeby())
        .with_pair(&x, &y, PairRule::new(50, 2, 1).with_impact(500))
        .with_pair(&x, &native, PairRule::new(50, 2, 1).with_impact(500))
        .emitting_events_to(chain.log_sink());

    let report = run(&book, &chain, &[x.clone(), y, native.clone()], settings())
        .await
        .unwrap();

    assert_eq!(report.sell, x);
    assert_eq!(report.buy, native);
    assert!(report.outcome.is_settled());
}

#[tokio::test]
async fn test_fallback_respects_max_slippage() {
    let (x, y, native) = (token(1, "X"), token(2, "Y"), weth());
    let chain = MockChain::for_wallet(&wallet()).with_balance(&x, 1000);
    let book = MockOrderBook::new(rinkeby())
        .with_pair(&x, &y, PairRule::new(50, 2, 1).with_impact(500))
        .with_pair(&x, &native, PairRule::new(50, 2, 1).with_impact(500));

    let mut tight = settings();
    tight.selection.max_slippage_bps = 500;
    let err = run(&book, &chain, &[x, y, native], tight).await.unwrap_err();

    assert!(matches!(
        trader_error(&err),
        Some(TraderError::NoTradableBalance { .. })
    ));
}

#[tokio::test]
async fn test_no_event_and_no_execution_times_out() {
    let (x, y) = (token(1, "X"), token(2, "Y"));
    let chain = MockChain::for_wallet(&wallet()).with_balance(&x, 1000);
    let book = MockOrderBook::new(rinkeby()).with_pair(&x, &y, PairRule::new(50, 2000, 950));
    book.set_executed(0);

    let err = run(&book, &chain, &[x, y], settings()).await.unwrap_err();

    match trader_error(&err) {
        Some(TraderError::SettlementTimeout { uid }) => {
            let placed = book.placed();
            let ctx = rinkeby();
            let expected = gpv2_trader::signing::order_uid(&ctx, &placed[0].order, wallet().address());
            assert_eq!(*uid, expected);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(err.to_string().contains("wasn't traded within timeout"));
    // the filter is removed even though no event arrived
    assert_eq!(chain.filters_closed(), 1);
}

#[tokio::test]
async fn test_status_fallback_confirms_execution() {
    let (x, y) = (token(1, "X"), token(2, "Y"));
    let chain = MockChain::for_wallet(&wallet())
        .with_balance(&x, 1000)
        .with_allowance(&x, U256::MAX);
    let book = MockOrderBook::new(rinkeby()).with_pair(&x, &y, PairRule::new(50, 2000, 950));
    book.set_executed(950);

    let report = run(&book, &chain, &[x, y], settings()).await.unwrap();

    assert_eq!(
        report.outcome,
        SettlementOutcome::SettledByStatus {
            executed_sell_amount: U256::from(950u64)
        }
    );
    assert!(chain.approvals().is_empty());
    assert_eq!(chain.filters_closed(), 1);
}

#[tokio::test]
async fn test_one_way_pairs_are_never_selected() {
    let (x, y) = (token(1, "X"), token(2, "Y"));
    let chain = MockChain::for_wallet(&wallet()).with_balance(&x, 1000);
    let book = MockOrderBook::new(rinkeby()).with_one_way(&x, &y, PairRule::new(50, 2, 1));

    let err = run(&book, &chain, &[x, y], settings()).await.unwrap_err();

    assert!(matches!(
        trader_error(&err),
        Some(TraderError::NoTradableBalance { .. })
    ));
    // forward and reverse probe, nothing more
    assert_eq!(book.quote_calls(), 2);
}

#[tokio::test]
async fn test_empty_account_fails_with_funding_guidance() {
    let (x, y) = (token(1, "X"), token(2, "Y"));
    let chain = MockChain::for_wallet(&wallet());
    let book = MockOrderBook::new(rinkeby()).with_pair(&x, &y, PairRule::new(50, 2, 1));

    let err = run(&book, &chain, &[x, y], settings()).await.unwrap_err();

    assert!(matches!(
        trader_error(&err),
        Some(TraderError::NoTradableBalance { .. })
    ));
    assert_eq!(book.quote_calls(), 0);
}

#[test]
fn test_unknown_network_rejected_up_front() {
    let err = ChainContext::from_chain_id(5).unwrap_err();
    assert_eq!(err.to_string(), "Unexpected network 5");
}
