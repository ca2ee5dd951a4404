mod batch_run;
mod engine;
mod redaction;
