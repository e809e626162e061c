mod reclaim;
