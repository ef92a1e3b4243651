mod jitter_buffer;
