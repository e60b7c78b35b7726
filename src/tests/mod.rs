
mod bid_escalator_tests;
mod fee_policy_tests;
mod head_feed_tests;
mod reconciler_tests;
