mod test_leaky_bucket;
mod test_sliding_log;
mod test_token_bucket;
