use {
    super::*,
    tokio::{
        fs::OpenOptions,
        io::{AsyncWriteExt, BufWriter},
    },
};

/// Appends events to a file, one JSON object per line.
pub struct FileSink {
    writer: BufWriter<tokio::fs::File>,
}

impl FileSink {
    pub async fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("failed to open events file `{}`", path.display()))?;

        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

#[async_trait]
impl EventSink for FileSink {
    async fn record(&mut self, mut event: Event) -> Result {
        event.stamp();
        let json = serde_json::to_string(&event)?;
        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result {
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {super::*, crate::event_sink::event::tests::share};

    #[tokio::test]
    async fn appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");

        let mut sink = FileSink::new(&path).await.unwrap();
        sink.record(share()).await.unwrap();
        sink.record(share()).await.unwrap();
        sink.close().await.unwrap();

        let mut sink = FileSink::new(&path).await.unwrap();
        sink.record(share()).await.unwrap();
        sink.close().await.unwrap();

        let contents = fs::read_to_string(&path).unwrap();
        let lines = contents.lines().collect::<Vec<&str>>();
        assert_eq!(lines.len(), 3);

        for line in lines {
            let Event::Share(share) = serde_json::from_str::<Event>(line).unwrap() else {
                panic!("expected share event");
            };
            assert!(share.timestamp.is_some());
            assert_eq!(share.worker, "rig1");
        }
    }
}
