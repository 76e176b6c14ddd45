//! Property tests for the reference-counted console

use gsm_coordinator::state::{ConsoleHandle, ConsoleLayout, ConsoleOptions};
use proptest::prelude::*;
use std::thread;

fn options() -> impl Strategy<Value = ConsoleOptions> {
    prop_oneof![
        Just(ConsoleOptions::default()),
        Just(ConsoleOptions::ocr_session()),
        Just(ConsoleOptions::dependency_install()),
        any::<bool>().prop_map(ConsoleOptions::area_selector),
    ]
}

proptest! {
    /// Visibility always equals "count > 0", whatever the call order.
    #[test]
    fn prop_visible_iff_held(ops in prop::collection::vec(prop::option::of(options()), 0..40)) {
        let console = ConsoleHandle::new();
        let mut expected = 0usize;

        for op in ops {
            match op {
                Some(opts) => {
                    let opened = console.acquire(&opts);
                    prop_assert_eq!(opened, expected == 0);
                    expected += 1;
                }
                None => {
                    let closed = console.release();
                    prop_assert_eq!(closed, expected == 1);
                    expected = expected.saturating_sub(1);
                }
            }
            prop_assert_eq!(console.count(), expected);
            prop_assert_eq!(console.is_visible(), expected > 0);
            prop_assert_eq!(console.layout().console_visible, expected > 0);
            if expected == 0 {
                prop_assert_eq!(console.layout(), ConsoleLayout::default());
            }
        }
    }

    /// Options only ever hide controls that acquiring shows.
    #[test]
    fn prop_options_never_reveal_hidden_cards(first in options(), second in options()) {
        let console = ConsoleHandle::new();
        console.acquire(&first);
        let before = console.layout();
        console.acquire(&second);
        let after = console.layout();

        prop_assert!(before.config_card_visible || !after.config_card_visible);
        prop_assert!(before.settings_card_visible || !after.settings_card_visible);
        prop_assert!(before.manual_hotkey_visible || !after.manual_hotkey_visible);
    }
}

#[test]
fn test_concurrent_holders_balance_out() {
    let console = ConsoleHandle::new();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let console = console.clone();
            thread::spawn(move || {
                for _ in 0..100 {
                    console.acquire(&ConsoleOptions::dependency_install());
                    console.release();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(console.count(), 0);
    assert!(!console.is_visible());
}
