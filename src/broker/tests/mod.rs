mod backoff;
mod durable;
