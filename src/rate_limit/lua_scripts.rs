/// Lua script for fixed window counting in Redis
///
/// Runs as a single atomic unit on the server, so concurrent callers can never
/// both observe the same count.
///
/// KEYS[1] = the counter key
/// ARGV[1] = window duration (milliseconds)
///
/// Returns: the counter value after this increment
pub const INCREMENT_WITH_EXPIRY_SCRIPT: &str = r#"
local key = KEYS[1]
local window_ms = tonumber(ARGV[1])

local current = redis.call('INCR', key)

-- Start the window on the first increment only
if current == 1 then
    redis.call('PEXPIRE', key, window_ms)
end

-- A key without a TTL would never reset
if redis.call('PTTL', key) == -1 then
    redis.call('PEXPIRE', key, window_ms)
end

return current
"#;

